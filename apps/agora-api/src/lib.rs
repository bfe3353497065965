pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod realtime;
pub mod routes;

use std::sync::Arc;

use agora_common::SnowflakeGenerator;
use config::Config;
use db::pool::DbPool;
use realtime::bus::FanoutBus;
use realtime::emitter::EventEmitter;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub bus: Arc<dyn FanoutBus>,
    pub emitter: EventEmitter,
    pub config: Arc<Config>,
    pub snowflake: Arc<SnowflakeGenerator>,
}
