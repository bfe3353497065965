/// Default number of stars at which a reply is promoted.
pub const DEFAULT_PROMOTE_THRESHOLD: i64 = 10;

/// Agora API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Shared secret for validating HS256 access tokens.
    pub token_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Optional Redis connection string. When set, fan-out runs over Redis
    /// pub/sub so multiple processes share one group space.
    pub redis_url: Option<String>,
    /// Star count at which a reply is marked promoted.
    pub promote_threshold: i64,
    /// Snowflake worker ID. Must differ between processes that share a
    /// database.
    pub worker_id: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            token_secret: required_var("TOKEN_SECRET"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4000),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            promote_threshold: std::env::var("PROMOTE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PROMOTE_THRESHOLD),
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
