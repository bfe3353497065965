use std::sync::Arc;

use axum_test::TestServer;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use agora_api::auth::tokens::mint_access_token;
use agora_api::config::{Config, DEFAULT_PROMOTE_THRESHOLD};
use agora_api::db::pool::DbPool;
use agora_api::models::membership::NewMembership;
use agora_api::models::user::NewUser;
use agora_api::realtime::bus::{FanoutBus, LocalBus};
use agora_api::realtime::emitter::EventEmitter;
use agora_api::AppState;
use agora_common::id::{prefix, prefixed_ulid};
use agora_common::SnowflakeGenerator;

/// Build a test AppState backed by the `_test` database and an in-process
/// fan-out bus. Run `agora-migrate -- --test` first.
pub async fn test_state() -> AppState {
    let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(env_path);

    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL env var is required for integration tests");
    let config = Config {
        database_url: with_test_db_suffix(&database_url),
        token_secret: std::env::var("TOKEN_SECRET")
            .unwrap_or_else(|_| "agora-test-secret".to_string()),
        port: 0,
        redis_url: None,
        promote_threshold: DEFAULT_PROMOTE_THRESHOLD,
        worker_id: 0,
    };

    let db = agora_api::db::pool::connect(&config.database_url);

    let bus: Arc<dyn FanoutBus> = Arc::new(LocalBus::new());
    let emitter = EventEmitter::new(bus.clone());
    let snowflake = Arc::new(SnowflakeGenerator::new(0));

    AppState {
        db,
        bus,
        emitter,
        config: Arc::new(config),
        snowflake,
    }
}

fn with_test_db_suffix(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };
    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }
    match query {
        Some(query) => format!("{prefix}/{db_name}_test?{query}"),
        None => format!("{prefix}/{db_name}_test"),
    }
}

/// TestServer over the full application router.
pub fn test_server(state: &AppState) -> TestServer {
    let app = agora_api::routes::router().with_state(state.clone());
    TestServer::new(app).expect("test server")
}

/// Mint a bearer token for a user with the test secret.
pub fn bearer(state: &AppState, user_id: &str) -> String {
    mint_access_token(&state.config.token_secret, user_id).expect("mint test token")
}

/// Insert a user row and return its ID.
pub async fn seed_user(db: &DbPool, display_name: &str, kind: &str) -> String {
    use agora_api::db::schema::users;

    let id = prefixed_ulid(prefix::USER);
    let email = format!("{id}@example.test");
    let mut conn = db.get().await.expect("pool");
    diesel::insert_into(users::table)
        .values(NewUser {
            id: &id,
            display_name,
            email: &email,
            kind,
            created_at: Utc::now(),
        })
        .execute(&mut conn)
        .await
        .expect("seed user");
    id
}

/// Insert a membership row directly, bypassing the join endpoint.
pub async fn seed_membership(db: &DbPool, community_id: &str, user_id: &str, level: &str) {
    use agora_api::db::schema::memberships;

    let mut conn = db.get().await.expect("pool");
    diesel::insert_into(memberships::table)
        .values(NewMembership {
            community_id,
            user_id,
            level,
            joined_at: Utc::now(),
        })
        .execute(&mut conn)
        .await
        .expect("seed membership");
}

/// Create a community through the API and return the response body
/// (community fields plus `rooms`).
pub async fn create_community(
    server: &TestServer,
    token: &str,
    name: &str,
) -> serde_json::Value {
    let resp = server
        .post("/api/v1/communities")
        .add_header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .json(&serde_json::json!({ "name": name }))
        .await;
    resp.assert_status(http::StatusCode::CREATED);
    resp.json::<serde_json::Value>()
}

/// Pull the room of a given kind out of a community response.
pub fn room_of_kind(community: &serde_json::Value, kind: &str) -> String {
    community["rooms"]
        .as_array()
        .expect("rooms array")
        .iter()
        .find(|room| room["kind"] == kind)
        .unwrap_or_else(|| panic!("no {kind} room in response"))["id"]
        .as_str()
        .expect("room id")
        .to_string()
}

/// Unique display/community name for test isolation.
pub fn unique_name(tag: &str) -> String {
    format!("{tag}-{}", prefixed_ulid("t"))
}

/// Delete a test user (CASCADE removes memberships, stars, alerts).
pub async fn cleanup_user(db: &DbPool, user_id: &str) {
    use agora_api::db::schema::users;

    let mut conn = db.get().await.expect("pool");
    diesel::delete(users::table.filter(users::id.eq(user_id)))
        .execute(&mut conn)
        .await
        .ok();
}

/// Delete a test community (CASCADE removes rooms, threads, replies).
pub async fn cleanup_community(db: &DbPool, community_id: &str) {
    use agora_api::db::schema::communities;

    let mut conn = db.get().await.expect("pool");
    diesel::delete(communities::table.filter(communities::id.eq(community_id)))
        .execute(&mut conn)
        .await
        .ok();
}
