use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration as StdDuration;
use tracing::info;

const SCHEMA: &str = include_str!("../../../sql/schema.sql");

/// Opens (creating if needed) the database file and applies the schema.
pub async fn open_pool(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Normal)
        .busy_timeout(StdDuration::from_secs(30))
        .statement_cache_capacity(100);

    let pool = SqlitePool::connect_with(options).await?;
    apply_schema(&pool).await?;
    info!("Opened signal database at {}", db_path);
    Ok(pool)
}

/// Single-connection in-memory database; every connection of a `:memory:`
/// pool would otherwise see its own empty database.
pub async fn open_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(SCHEMA).execute(pool).await?;
    Ok(())
}
