use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub type DbPool = Pool<AsyncPgConnection>;

/// Covers request handlers plus the spawned alert tasks.
const MAX_CONNECTIONS: usize = 20;

/// Build the async Postgres pool the whole service shares. Connections are
/// established lazily on first checkout.
pub fn connect(database_url: &str) -> DbPool {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder(manager)
        .max_size(MAX_CONNECTIONS)
        .build()
        .expect("failed to build connection pool")
}
