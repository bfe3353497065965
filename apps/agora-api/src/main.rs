use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use agora_api::config::Config;
use agora_api::realtime::bus::{FanoutBus, LocalBus};
use agora_api::realtime::emitter::EventEmitter;
use agora_api::realtime::redis_bus::RedisBus;
use agora_api::routes::ApiDoc;
use agora_api::AppState;
use agora_common::SnowflakeGenerator;

#[tokio::main]
async fn main() {
    // Load .env from the CWD or the crate dir; absent files are fine.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = agora_api::db::pool::connect(&config.database_url);

    // Fan-out bus: Redis-backed when REDIS_URL is set, otherwise in-process.
    let bus: Arc<dyn FanoutBus> = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let bus = RedisBus::connect(redis_url)
                .await
                .expect("failed to connect to Redis");
            tracing::info!("fan-out over Redis pub/sub");
            Arc::new(bus)
        }
        None => {
            tracing::info!("fan-out in-process only");
            Arc::new(LocalBus::new())
        }
    };
    let emitter = EventEmitter::new(bus.clone());

    let snowflake = Arc::new(SnowflakeGenerator::new(config.worker_id));

    tracing::info!(worker_id = config.worker_id, "agora-api configured");

    let state = AppState {
        db,
        bus,
        emitter,
        config: Arc::new(config),
        snowflake,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(agora_api::routes::router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "agora-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
