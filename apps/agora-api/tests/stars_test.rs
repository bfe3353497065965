mod common;

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;

/// Clone the shared state with a small promotion threshold so a single
/// star is enough to promote a reply.
fn with_promote_threshold(state: &agora_api::AppState, threshold: i64) -> agora_api::AppState {
    let mut config = (*state.config).clone();
    config.promote_threshold = threshold;
    agora_api::AppState {
        config: Arc::new(config),
        ..state.clone()
    }
}

async fn setup_thread(
    state: &agora_api::AppState,
    server: &axum_test::TestServer,
) -> (String, String, serde_json::Value, i64) {
    let owner_id = common::seed_user(&state.db, "Sasha", "normal").await;
    let owner_token = common::bearer(state, &owner_id);
    let community =
        common::create_community(server, &owner_token, &common::unique_name("stars")).await;
    let room_id = common::room_of_kind(&community, "general_discussion");

    let thread = server
        .post(&format!("/api/v1/rooms/{room_id}/threads"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "title": "Star target", "body": "Please star" }))
        .await;
    thread.assert_status(StatusCode::CREATED);
    let thread: serde_json::Value = thread.json();
    let thread_id = thread["id"].as_i64().unwrap();

    (owner_id, owner_token, community, thread_id)
}

// ---------------------------------------------------------------------------
// POST /api/v1/stars
// ---------------------------------------------------------------------------

#[tokio::test]
async fn thread_star_toggles_on_and_off() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;

    let resp = server
        .post("/api/v1/stars")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "thread": thread_id }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let star: serde_json::Value = resp.json();
    assert!(star["id"].as_i64().unwrap() > 0);
    assert_eq!(star["user_id"], owner_id.as_str());
    assert_eq!(star["thread_id"].as_i64().unwrap(), thread_id);
    assert!(star["reply_id"].is_null());

    let detail = server
        .get(&format!("/api/v1/threads/{thread_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    let detail: serde_json::Value = detail.json();
    assert_eq!(detail["likes"], 1);
    assert_eq!(detail["liked_by_me"], true);

    // Toggling again removes the star.
    let resp = server
        .post("/api/v1/stars")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "thread": thread_id }))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    let detail = server
        .get(&format!("/api/v1/threads/{thread_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    let detail: serde_json::Value = detail.json();
    assert_eq!(detail["likes"], 0);
    assert_eq!(detail["liked_by_me"], false);

    common::cleanup_community(&state.db, community["id"].as_str().unwrap()).await;
    common::cleanup_user(&state.db, &owner_id).await;
}

#[tokio::test]
async fn star_target_must_be_exactly_one() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;

    let resp = server
        .post("/api/v1/stars")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server
        .post("/api/v1/stars")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "thread": thread_id, "reply": 1 }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server
        .post("/api/v1/stars")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "thread": 987654321098i64 }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    common::cleanup_community(&state.db, community["id"].as_str().unwrap()).await;
    common::cleanup_user(&state.db, &owner_id).await;
}

#[tokio::test]
async fn reply_star_promotes_at_threshold() {
    let state = with_promote_threshold(&common::test_state().await, 1);
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;

    let reply = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "body": "Insightful answer" }))
        .await;
    let reply: serde_json::Value = reply.json();
    let reply_id = reply["id"].as_i64().unwrap();

    let resp = server
        .post("/api/v1/stars")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "reply": reply_id }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let star: serde_json::Value = resp.json();
    assert_eq!(star["reply_id"].as_i64().unwrap(), reply_id);
    assert!(star["thread_id"].is_null());

    let detail = server
        .get(&format!("/api/v1/threads/{thread_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    let detail: serde_json::Value = detail.json();
    let node = &detail["reply_tree"].as_array().unwrap()[0];
    assert_eq!(node["likes"], 1);
    assert_eq!(node["promoted"], true);
    assert_eq!(node["liked_by_me"], true);

    // Removing the star drops the count below the threshold again.
    let resp = server
        .post("/api/v1/stars")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "reply": reply_id }))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    let detail = server
        .get(&format!("/api/v1/threads/{thread_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    let detail: serde_json::Value = detail.json();
    let node = &detail["reply_tree"].as_array().unwrap()[0];
    assert_eq!(node["likes"], 0);
    assert_eq!(node["promoted"], false);
    assert_eq!(node["liked_by_me"], false);

    common::cleanup_community(&state.db, community["id"].as_str().unwrap()).await;
    common::cleanup_user(&state.db, &owner_id).await;
}

#[tokio::test]
async fn concurrent_toggles_leave_a_consistent_count() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;

    // Same user, simultaneous toggles. The row lock and the partial unique
    // index keep every interleaving at zero or one star; a loser surfaces as
    // a conflict, never as a duplicate row.
    let mut statuses = Vec::new();
    for _ in 0..2 {
        let (first, second) = tokio::join!(
            server
                .post("/api/v1/stars")
                .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
                .json(&serde_json::json!({ "thread": thread_id })),
            server
                .post("/api/v1/stars")
                .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
                .json(&serde_json::json!({ "thread": thread_id })),
        );
        statuses.push(first.status_code());
        statuses.push(second.status_code());
    }

    for status in statuses {
        assert!(
            matches!(
                status,
                StatusCode::CREATED | StatusCode::NO_CONTENT | StatusCode::CONFLICT
            ),
            "unexpected toggle status {status}"
        );
    }

    let detail = server
        .get(&format!("/api/v1/threads/{thread_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    let detail: serde_json::Value = detail.json();
    let likes = detail["likes"].as_i64().unwrap();
    assert!(likes == 0 || likes == 1, "star count out of range: {likes}");
    assert_eq!(detail["liked_by_me"], likes == 1);

    common::cleanup_community(&state.db, community["id"].as_str().unwrap()).await;
    common::cleanup_user(&state.db, &owner_id).await;
}

#[tokio::test]
async fn reply_below_threshold_stays_unpromoted() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;

    let reply = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "body": "Just okay" }))
        .await;
    let reply: serde_json::Value = reply.json();

    let resp = server
        .post("/api/v1/stars")
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "reply": reply["id"] }))
        .await;
    resp.assert_status(StatusCode::CREATED);

    let detail = server
        .get(&format!("/api/v1/threads/{thread_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    let detail: serde_json::Value = detail.json();
    let node = &detail["reply_tree"].as_array().unwrap()[0];
    assert_eq!(node["likes"], 1);
    assert_eq!(node["promoted"], false);

    common::cleanup_community(&state.db, community["id"].as_str().unwrap()).await;
    common::cleanup_user(&state.db, &owner_id).await;
}
