//! Transaction coordinator.
//!
//! `transaction` either joins the transaction the context already resolves
//! to, or begins a new one on a worker of the context's pool and owns its
//! commit/rollback/release protocol:
//!
//! 1. lease a connection and open a transaction on it (auto-commit off)
//! 2. run the body on one worker with a context carrying the transaction
//! 3. commit, or roll back when the body failed or set rollback-only
//! 4. return the connection to the pool, on every path
//!
//! Nested calls never open a second transaction: they run inline, share the
//! one connection, and contribute to the one commit/rollback decision.

use std::future::Future;
use tracing::Instrument;

use crate::context::Context;
use crate::error::Error;
use crate::transaction::Transaction;

impl Context {
    /// Run `body` inside exactly one physical transaction.
    ///
    /// If this context resolves to an active transaction (see
    /// [`Context::current_transaction`]), `body` runs immediately against
    /// it. Otherwise a new transaction is begun and `body` runs pinned to a
    /// worker of this context's pool.
    ///
    /// A body failure rolls the transaction back and is returned unchanged.
    /// If `body` returns normally after setting rollback-only, the
    /// transaction is rolled back and the body's value is still returned.
    /// Lease, commit and rollback failures are converted into `E`. A panic in
    /// the body rolls back, releases the connection and resumes unwinding in
    /// the caller. Dropping the returned future before it completes cancels
    /// the body and rolls back.
    pub async fn transaction<F, Fut, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        if let Some(tx) = self.current_transaction() {
            tracing::trace!(transaction = %tx.id(), "joining enclosing transaction");
            return body(self.with_transaction(tx)).await;
        }

        let task = self
            .shared
            .workers
            .spawn_pinned(self.clone().run_transaction(body));

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(E::from(err)),
        }
    }

    async fn run_transaction<F, Fut, T, E>(self, body: F) -> Result<T, E>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Error>,
    {
        let tx = Transaction::begin(&self.shared.data_source, self.shared.id, &self.shared.name)
            .await?;

        let span = tracing::debug_span!(
            "transaction",
            context = %self.shared.name,
            id = %tx.id()
        );

        async move {
            let _release = tx.connection().release_guard();
            let tx_ctx = self.with_transaction(tx.clone());

            match tx.clone().scope(body(tx_ctx)).await {
                Ok(value) if tx.rollback_only() => {
                    tracing::debug!("rollback-only set, rolling back");
                    tx.rollback().await?;
                    Ok(value)
                }
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    tracing::debug!("transaction body failed, rolling back");
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::error!(
                            error = %rollback_err,
                            "rollback after failed body also failed; returning the body's failure"
                        );
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}
