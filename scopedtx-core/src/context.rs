//! Execution contexts.
//!
//! A [`Context`] binds a worker pool to a data source. It is never mutated:
//! starting a transaction derives a new context that additionally carries the
//! [`Transaction`], and nested calls made with that derived context join it.

use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::datasource;
use crate::error::{Error, Result};
use crate::transaction::Transaction;
use crate::worker::WorkerPool;

/// Bound worker pool plus data source, optionally extended with an active
/// transaction.
///
/// Cloning is cheap. Create one per logical database at startup and hand
/// clones to whatever needs database access.
///
/// ```ignore
/// let ctx = create_context("orders", 4, pool)?;
///
/// let id = ctx
///     .transaction(|tx| async move {
///         tx.with_connection(|conn| async move {
///             let mut conn = conn.lock().await?;
///             let row: (i64,) = sqlx::query_as("INSERT INTO orders DEFAULT VALUES RETURNING id")
///                 .fetch_one(&mut *conn)
///                 .await?;
///             Ok::<_, scopedtx_core::Error>(row.0)
///         })
///         .await
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct Context {
    pub(crate) shared: Arc<Shared>,
    transaction: Option<Transaction>,
}

pub(crate) struct Shared {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) workers: WorkerPool,
    pub(crate) data_source: SqlitePool,
}

/// Bind a pool of `pool_size` workers named after `name` to `data_source`.
///
/// The resulting context carries no transaction.
pub fn create_context(
    name: impl Into<String>,
    pool_size: usize,
    data_source: SqlitePool,
) -> Result<Context> {
    Context::builder(name)
        .pool_size(pool_size)
        .data_source(data_source)
        .build()
}

impl Context {
    pub fn builder(name: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            name: name.into(),
            pool_size: num_cpus::get().max(1),
            data_source: None,
        }
    }

    /// Build the data source described by `config` and bind it to a new
    /// worker pool.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let data_source = datasource::connect(config)?;
        create_context(config.name.clone(), config.pool_size, data_source)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn pool_size(&self) -> usize {
        self.shared.workers.size()
    }

    pub fn data_source(&self) -> &SqlitePool {
        &self.shared.data_source
    }

    /// Transaction carried by this context value.
    pub fn transaction_handle(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// Transaction this context would join: the one it carries, else the
    /// transaction whose body the current task is running, provided that
    /// transaction was started from the same root context.
    pub fn current_transaction(&self) -> Option<Transaction> {
        self.transaction.clone().or_else(|| {
            Transaction::current().filter(|tx| tx.context_id() == self.shared.id)
        })
    }

    /// Rollback-only flag of the transaction this context resolves to;
    /// `false` without one.
    pub fn rollback_only(&self) -> bool {
        self.current_transaction()
            .map(|tx| tx.rollback_only())
            .unwrap_or(false)
    }

    /// Set the rollback-only flag of the transaction this context resolves
    /// to, carried or ambient. No-op when it resolves to none.
    pub fn set_rollback_only(&self, value: bool) {
        if let Some(tx) = self.current_transaction() {
            tx.set_rollback_only(value);
        }
    }

    /// Derive a context carrying `transaction`.
    pub(crate) fn with_transaction(&self, transaction: Transaction) -> Self {
        Self {
            shared: self.shared.clone(),
            transaction: Some(transaction),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.shared.name)
            .field("pool_size", &self.shared.workers.size())
            .field("transaction", &self.transaction.as_ref().map(Transaction::id))
            .finish()
    }
}

/// Builder for [`Context`].
///
/// A context without a data source is a programming error and is reported by
/// [`ContextBuilder::build`], before any database call is attempted.
#[derive(Debug)]
pub struct ContextBuilder {
    name: String,
    pool_size: usize,
    data_source: Option<SqlitePool>,
}

impl ContextBuilder {
    /// Number of workers (defaults to the number of CPUs).
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn data_source(mut self, data_source: SqlitePool) -> Self {
        self.data_source = Some(data_source);
        self
    }

    pub fn build(self) -> Result<Context> {
        let data_source = self.data_source.ok_or_else(|| Error::MissingDataSource {
            context: self.name.clone(),
        })?;

        if self.pool_size == 0 {
            return Err(Error::InvalidPoolSize {
                context: self.name,
                size: 0,
            });
        }

        let workers = WorkerPool::new(self.name.clone(), self.pool_size)?;

        Ok(Context {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                name: self.name,
                workers,
                data_source,
            }),
            transaction: None,
        })
    }
}
