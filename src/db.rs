//! SQLite connection pool.
//!
//! Every command opens its own pool in WAL mode and closes it before
//! returning; no connection outlives a single invocation.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

/// Open the index database, creating the file and its parent directory.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    open(config, true).await
}

/// Open the index database only if it already exists.
///
/// Returns `Ok(None)` when there is no database file yet, so read-only
/// commands can report an empty index without creating one.
pub async fn connect_existing(config: &Config) -> Result<Option<SqlitePool>> {
    if !config.db.path.exists() {
        return Ok(None);
    }
    Ok(Some(open(config, false).await?))
}

async fn open(config: &Config, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.db.path.display()))?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
