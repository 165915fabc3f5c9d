//! Data-source construction.
//!
//! The data source is an sqlx SQLite pool. It is shared by every transaction
//! of a context and is itself safe for concurrent leasing; its
//! `max_connections` is the only bound on concurrently leased connections.
//! Leases beyond capacity wait for a free connection until the acquire
//! timeout elapses.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Create a SQLite connection pool from `config`.
///
/// Nothing is connected eagerly; the first lease opens the first connection.
pub fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    config.validate()?;

    let mut options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| Error::config(format!("invalid database url '{}': {}", config.url, e)))?
        .create_if_missing(config.create_if_missing)
        .busy_timeout(config.busy_timeout()) // Lets concurrent writers queue instead of failing with SQLITE_BUSY
        .foreign_keys(true);

    if config.wal {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal); // WAL mode allows relaxed sync
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_lazy_with(options);

    tracing::debug!(
        name = %config.name,
        url = %config.url,
        max_connections = config.max_connections,
        "data source configured"
    );

    Ok(pool)
}
