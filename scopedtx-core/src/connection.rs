//! Leased connections.
//!
//! A [`Connection`] is a shared handle over one lease from the data source.
//! The lease lives in a slot that also records how it ended, so the
//! connection goes back to the pool exactly once: whoever ends the lease takes
//! it out of the slot, and every later attempt finds the slot closed.

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::context::Context;
use crate::error::{Error, Result};

/// Lifecycle of a leased connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Leased and usable
    Open,
    /// Transaction committed, connection returned to the pool
    Committed,
    /// Transaction rolled back, connection returned to the pool
    RolledBack,
    /// Returned to the pool without a commit or rollback outcome
    Released,
}

pub(crate) enum Lease {
    /// Plain lease, auto-commit on
    Pooled(PoolConnection<Sqlite>),
    /// Lease with an open transaction (auto-commit off)
    Transaction(sqlx::Transaction<'static, Sqlite>),
}

impl Lease {
    fn connection_mut(&mut self) -> &mut SqliteConnection {
        match self {
            Lease::Pooled(conn) => &mut **conn,
            Lease::Transaction(tx) => &mut **tx,
        }
    }
}

pub(crate) enum Slot {
    Open(Lease),
    Closed(ConnectionState),
}

/// Shared handle to a leased connection.
///
/// Cloning is cheap and every clone refers to the same lease. Statements go
/// through [`Connection::lock`]:
///
/// ```ignore
/// let mut conn = connection.lock().await?;
/// sqlx::query("INSERT INTO actress(first_name) VALUES (?)")
///     .bind("Kate")
///     .execute(&mut *conn)
///     .await?;
/// ```
///
/// A lock guard must be dropped before a nested `with_connection`,
/// `transaction` or `with_session` call on the same context, which locks
/// the same connection again.
#[derive(Clone)]
pub struct Connection {
    slot: Arc<Mutex<Slot>>,
}

impl Connection {
    pub(crate) fn new(lease: Lease) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Open(lease))),
        }
    }

    /// Wait for exclusive use of the connection.
    ///
    /// Fails with [`Error::ConnectionReleased`] once the lease has ended.
    pub async fn lock(&self) -> Result<MappedMutexGuard<'_, SqliteConnection>> {
        let guard = self.slot.lock().await;
        MutexGuard::try_map(guard, |slot| match slot {
            Slot::Open(lease) => Some(lease.connection_mut()),
            Slot::Closed(_) => None,
        })
        .map_err(|_| Error::ConnectionReleased)
    }

    /// Current lifecycle state. Reports `Open` while another holder has
    /// the connection locked.
    pub fn state(&self) -> ConnectionState {
        match self.slot.try_lock() {
            Ok(slot) => match &*slot {
                Slot::Open(_) => ConnectionState::Open,
                Slot::Closed(state) => *state,
            },
            Err(_) => ConnectionState::Open,
        }
    }

    /// True when both handles refer to the same lease.
    pub fn same_lease(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Take the lease out of the slot, marking it closed with `state`.
    ///
    /// Returns `None` when the lease already ended.
    pub(crate) async fn take(&self, state: ConnectionState) -> Option<Lease> {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Closed(state)) {
            Slot::Open(lease) => Some(lease),
            closed @ Slot::Closed(_) => {
                *slot = closed;
                None
            }
        }
    }

    /// Correct the recorded outcome of an already closed lease.
    pub(crate) async fn mark(&self, state: ConnectionState) {
        let mut slot = self.slot.lock().await;
        if let Slot::Closed(_) = &*slot {
            *slot = Slot::Closed(state);
        }
    }

    /// Return a plain lease to the pool.
    pub(crate) async fn release(&self) {
        drop(self.take(ConnectionState::Released).await);
    }

    pub(crate) fn release_guard(&self) -> ReleaseGuard {
        ReleaseGuard {
            connection: self.clone(),
        }
    }
}

impl Context {
    /// Run `body` with a usable connection.
    ///
    /// Inside a transaction this is the transaction's connection, which stays
    /// owned by the transaction. Otherwise a fresh connection is leased for
    /// the duration of `body`, on a worker of this context's pool, and
    /// returned to the pool on every exit path including cancellation.
    pub async fn with_connection<F, Fut, T, E>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Connection) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        if let Some(tx) = self.current_transaction() {
            return body(tx.connection().clone()).await;
        }

        let task = self
            .shared
            .workers
            .spawn_pinned(self.clone().run_with_lease(body));

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(E::from(err)),
        }
    }

    async fn run_with_lease<F, Fut, T, E>(self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        let lease = self
            .shared
            .data_source
            .acquire()
            .await
            .map_err(|source| Error::lease(self.shared.name.as_str(), source))?;

        let connection = Connection::new(Lease::Pooled(lease));
        let _release = connection.release_guard();

        let outcome = body(connection.clone()).await;
        connection.release().await;
        outcome
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .finish()
    }
}

/// Releases a still-open lease when dropped.
///
/// Normal exits end the lease explicitly before the guard drops, so this only
/// fires when the owning future is cancelled or unwinds. Dropping an open
/// sqlx transaction queues its rollback, and dropping the pool connection
/// returns it to the pool.
pub(crate) struct ReleaseGuard {
    connection: Connection,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Ok(mut slot) = self.connection.slot.try_lock() else {
            // An escaped clone holds the lock; the lease ends with the last clone.
            tracing::warn!("connection locked elsewhere during release; deferring to last handle");
            return;
        };

        if let Slot::Open(_) = &*slot {
            *slot = Slot::Closed(ConnectionState::Released);
            tracing::debug!("connection released by drop guard");
        }
    }
}
