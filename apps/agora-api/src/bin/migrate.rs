//! Standalone migration runner for agora-api.
//!
//! Usage:
//!   cargo run -p agora-api --bin agora-migrate
//!   cargo run -p agora-api --bin agora-migrate -- --test
//!
//! `--test` targets the `<name>_test` database used by the integration
//! suite. Reads DATABASE_URL from the environment (or .env via dotenvy).

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");
    let database_url = if std::env::args().any(|arg| arg == "--test") {
        test_database_url(&database_url)
    } else {
        database_url
    };

    let mut conn =
        PgConnection::establish(&database_url).expect("failed to connect to database");

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .expect("failed to run migrations");

    match applied.len() {
        0 => println!("Database is up to date."),
        n => {
            for migration in &applied {
                println!("applied {migration}");
            }
            println!("{n} migration(s) applied.");
        }
    }
}

/// Rewrite the database name in `database_url` to its `_test` twin, leaving
/// any query string intact.
fn test_database_url(database_url: &str) -> String {
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

#[cfg(test)]
mod tests {
    use super::test_database_url;

    #[test]
    fn appends_test_suffix() {
        assert_eq!(
            test_database_url("postgres://u:p@localhost/agora"),
            "postgres://u:p@localhost/agora_test"
        );
    }

    #[test]
    fn keeps_query_string() {
        assert_eq!(
            test_database_url("postgres://localhost/agora?sslmode=disable"),
            "postgres://localhost/agora_test?sslmode=disable"
        );
    }

    #[test]
    fn already_suffixed_urls_pass_through() {
        let url = "postgres://localhost/agora_test";
        assert_eq!(test_database_url(url), url);
    }
}
