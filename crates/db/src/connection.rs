use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use cabincall_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the pool described by `[database]` config. Every connection runs
/// the same session pragmas: foreign keys for the request -> message
/// cascade, WAL so pollers read while the store writes, and a busy timeout
/// so readers wait out short write locks instead of erroring.
pub async fn connect(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(database.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(database.timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&database.url)
        .await
}

/// Single-connection in-memory database for tests.
pub fn ephemeral_config() -> DatabaseConfig {
    DatabaseConfig { url: "sqlite::memory:".to_string(), max_connections: 1, timeout_secs: 5 }
}
