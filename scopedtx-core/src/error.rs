//! Structured error types for scopedtx-core.
//!
//! Uses `thiserror` so coordinator failures compose with caller error types:
//! every entry point that runs a body is generic over `E: From<Error>`, and
//! coordinator failures (lease, commit, rollback, dispatch) are converted
//! into the caller's `E`. A failure raised by the body itself is never
//! rewritten.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for scopedtx-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Context was built without a data source
    #[error("no data source bound to context '{context}'")]
    MissingDataSource { context: String },

    /// Worker pool must have at least one worker
    #[error("invalid worker pool size {size} for context '{context}': must be at least 1")]
    InvalidPoolSize { context: String, size: usize },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Config file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    /// Config file is not valid TOML for `DatabaseConfig`
    #[error("failed to parse config: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Leasing a connection (and opening a transaction on it) failed
    #[error("failed to lease connection from '{context}': {source}")]
    Lease {
        context: String,
        source: sqlx::Error,
    },

    /// COMMIT failed; the connection has been released
    #[error("failed to commit transaction {id}: {source}")]
    Commit { id: Uuid, source: sqlx::Error },

    /// ROLLBACK failed; the connection has been released
    #[error("failed to roll back transaction {id}: {source}")]
    Rollback { id: Uuid, source: sqlx::Error },

    /// A connection handle was used after its lease ended
    #[error("connection already released")]
    ConnectionReleased,

    /// Worker threads could not be started
    #[error("failed to start worker pool '{name}': {source}")]
    WorkerSpawn { name: String, source: io::Error },

    /// The pinned task never completed because its worker shut down
    #[error("worker pool '{name}' shut down before the task completed")]
    WorkerShutdown { name: String },

    /// Statement failure inside a body
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Result type alias for scopedtx-core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn lease(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Lease {
            context: context.into(),
            source,
        }
    }

    /// True for failures of the data source itself rather than of a body.
    pub fn is_lease_failure(&self) -> bool {
        matches!(self, Self::Lease { .. })
    }
}
