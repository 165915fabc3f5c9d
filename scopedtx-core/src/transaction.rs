//! Transactions: one leased connection with auto-commit off, plus the
//! rollback-only flag shared by every nesting level.

use sqlx::SqlitePool;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::connection::{Connection, ConnectionState, Lease};
use crate::error::{Error, Result};

tokio::task_local! {
    /// Transaction whose body the current task is running.
    static CURRENT: Transaction;
}

/// Handle to an active transaction.
///
/// Cloning is cheap; all clones share the connection and the rollback-only
/// flag, so setting the flag at any nesting depth decides the outcome of the
/// one physical transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

struct TransactionInner {
    id: Uuid,
    context_id: Uuid,
    connection: Connection,
    rollback_only: AtomicBool,
}

impl Transaction {
    /// Lease a connection and turn auto-commit off by opening a transaction.
    pub(crate) async fn begin(
        pool: &SqlitePool,
        context_id: Uuid,
        context_name: &str,
    ) -> Result<Self> {
        let tx = pool
            .begin()
            .await
            .map_err(|source| Error::lease(context_name, source))?;

        let id = Uuid::new_v4();
        tracing::debug!(transaction = %id, context = %context_name, "transaction begun");

        Ok(Self {
            inner: Arc::new(TransactionInner {
                id,
                context_id,
                connection: Connection::new(Lease::Transaction(tx)),
                rollback_only: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub(crate) fn context_id(&self) -> Uuid {
        self.inner.context_id
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn rollback_only(&self) -> bool {
        self.inner.rollback_only.load(Ordering::SeqCst)
    }

    /// Request that the transaction roll back instead of commit, without
    /// failing the body.
    pub fn set_rollback_only(&self, value: bool) {
        self.inner.rollback_only.store(value, Ordering::SeqCst);
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Commit and return the connection to the pool.
    pub(crate) async fn commit(&self) -> Result<()> {
        let connection = self.connection();
        // Stays Released unless COMMIT completes
        let Some(Lease::Transaction(tx)) = connection.take(ConnectionState::Released).await else {
            return Err(Error::ConnectionReleased);
        };

        // A failed COMMIT drops the transaction, which rolls it back.
        tx.commit().await.map_err(|source| Error::Commit {
            id: self.id(),
            source,
        })?;
        connection.mark(ConnectionState::Committed).await;

        tracing::debug!(transaction = %self.id(), "transaction committed");
        Ok(())
    }

    /// Roll back and return the connection to the pool.
    pub(crate) async fn rollback(&self) -> Result<()> {
        let connection = self.connection();
        let Some(Lease::Transaction(tx)) = connection.take(ConnectionState::Released).await else {
            return Err(Error::ConnectionReleased);
        };

        tx.rollback().await.map_err(|source| Error::Rollback {
            id: self.id(),
            source,
        })?;
        connection.mark(ConnectionState::RolledBack).await;

        tracing::debug!(transaction = %self.id(), "transaction rolled back");
        Ok(())
    }

    /// Run `future` with `self` as the task's current transaction.
    pub(crate) async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT.scope(self, future).await
    }

    /// The transaction whose body the current task is running, if any.
    pub(crate) fn current() -> Option<Transaction> {
        CURRENT.try_with(Transaction::clone).ok()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("rollback_only", &self.rollback_only())
            .field("state", &self.state())
            .finish()
    }
}
