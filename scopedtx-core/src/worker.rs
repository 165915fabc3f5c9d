//! Fixed-size worker pools.
//!
//! Each worker is a dedicated OS thread driving its own single-threaded tokio
//! runtime, so a task handed to a worker is polled on that thread from start
//! to finish. Tasks on one worker still interleave at their await points: a
//! transaction waiting on a lease or a busy database does not block the other
//! transactions pinned to the same worker.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// A named pool of single-threaded workers.
///
/// Dropping the pool stops every worker. Each worker drops its runtime on its
/// own thread, which cancels the tasks still pinned to it.
pub struct WorkerPool {
    name: String,
    workers: Vec<Worker>,
    next: AtomicUsize,
}

struct Worker {
    handle: Handle,
    shutdown: Option<oneshot::Sender<()>>,
}

impl WorkerPool {
    /// Start `size` workers whose threads are named `"{name}-{index}"`.
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self> {
        let name = name.into();
        if size == 0 {
            return Err(Error::InvalidPoolSize {
                context: name,
                size,
            });
        }

        let workers = (0..size)
            .map(|index| Worker::start(&name, index))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(pool = %name, size, "worker pool started");

        Ok(Self {
            name,
            workers,
            next: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Run `future` to completion on one worker, chosen round-robin.
    ///
    /// The returned [`PinnedTask`] resolves to the future's output. Dropping
    /// it early aborts the pinned task.
    pub fn spawn_pinned<F>(&self, future: F) -> PinnedTask<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        PinnedTask {
            handle: self.workers[index].handle.spawn(future),
            pool: self.name.clone(),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.workers.len())
            .finish()
    }
}

impl Worker {
    fn start(pool: &str, index: usize) -> Result<Self> {
        let spawn_error = |source| Error::WorkerSpawn {
            name: pool.to_string(),
            source,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(spawn_error)?;
        let handle = runtime.handle().clone();
        let (shutdown, stopped) = oneshot::channel::<()>();

        let name = format!("{pool}-{index}");
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                // Either an explicit signal or the pool being dropped ends the wait.
                runtime.block_on(async {
                    let _ = stopped.await;
                });
                drop(runtime);
                tracing::debug!(worker = %name, "worker stopped");
            })
            .map_err(spawn_error)?;

        Ok(Self {
            handle,
            shutdown: Some(shutdown),
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Handle to a task pinned to one worker.
///
/// A panic inside the task is re-raised in the awaiting caller.
#[must_use = "dropping a PinnedTask aborts the task"]
pub struct PinnedTask<T> {
    handle: JoinHandle<T>,
    pool: String,
}

impl<T> Future for PinnedTask<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(output)) => Poll::Ready(Ok(output)),
            Poll::Ready(Err(err)) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::WorkerShutdown {
                name: self.pool.clone(),
            })),
        }
    }
}

impl<T> Drop for PinnedTask<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
