use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Connection options for the corpus database. Creates the parent
/// directory and the file if missing.
pub fn connect_options(config: &Config) -> Result<SqliteConnectOptions> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.pool.acquire_timeout_ms));

    Ok(options)
}

/// A small sqlx pool for schema setup and ingestion. Retrieval uses the
/// service's own connection pool instead.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(connect_options(config)?)
        .await?;

    Ok(pool)
}
