//! scopedtx-core: context-scoped transactions for async SQLite access
//!
//! A [`Context`] binds a fixed-size worker pool to a data source. Units of
//! work share it to lease connections transparently and to compose nested
//! calls into one physical transaction with a single commit/rollback
//! boundary.

pub mod config;
pub mod connection;
pub mod context;
mod coordinator;
pub mod datasource;
pub mod error;
pub mod transaction;
pub mod worker;

pub use config::DatabaseConfig;
pub use connection::{Connection, ConnectionState};
pub use context::{create_context, Context, ContextBuilder};
pub use error::{Error, Result};
pub use transaction::Transaction;
pub use worker::{PinnedTask, WorkerPool};
