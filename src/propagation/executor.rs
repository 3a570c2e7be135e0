//! Spawning work with a snapshot applied.

use std::future::Future;
use std::thread;

use super::snapshot::ContextSnapshot;
use crate::error::PropagationError;

/// Spawns threads and tokio tasks that run with a snapshot applied.
///
/// The snapshot is taken from `supplier` when the work is submitted, on the
/// submitting thread, and released when the work finishes on any exit path.
///
/// ```no_run
/// use sightline::propagation::{ContextExecutor, ContextRegistry, ContextSnapshot};
///
/// let registry = ContextRegistry::global();
/// let executor = ContextExecutor::new(|| {
///     ContextSnapshot::capture_all(registry).unwrap_or_default()
/// });
/// let handle = executor.spawn_thread(|| "done");
/// assert_eq!(handle.join().unwrap().unwrap(), "done");
/// ```
#[derive(Debug, Clone)]
pub struct ContextExecutor<S> {
    supplier: S,
}

impl<S> ContextExecutor<S>
where
    S: Fn() -> ContextSnapshot,
{
    pub fn new(supplier: S) -> Self {
        Self { supplier }
    }

    /// Capture a snapshot now.
    pub fn snapshot(&self) -> ContextSnapshot {
        (self.supplier)()
    }

    /// Run `f` on a new OS thread.
    pub fn spawn_thread<F, T>(&self, f: F) -> thread::JoinHandle<Result<T, PropagationError>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        thread::spawn(self.snapshot().wrap(f))
    }

    /// Run `future` as a tokio task. Must be called within a runtime.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<Result<F::Output, PropagationError>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.snapshot().wrap_future(future))
    }

    /// Run blocking `f` on tokio's blocking pool.
    pub fn spawn_blocking<F, T>(&self, f: F) -> tokio::task::JoinHandle<Result<T, PropagationError>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(self.snapshot().wrap(f))
    }
}
