//! Session error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Lease, transaction or connection failure from the coordinator
    #[error(transparent)]
    Core(#[from] scopedtx_core::Error),

    #[error("statement failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("no value bound for parameter :{name}")]
    MissingParameter { name: String },

    #[error("expected exactly one row, got {actual}")]
    UnexpectedRowCount { actual: usize },
}
