//! Snapshots: capture on one thread, apply on another.
//!
//! ```text
//!   thread A                          thread B
//!   ────────                          ────────
//!   capture_all(registry) ──snapshot──► set_thread_locals()  (guard)
//!                                         ... work ...
//!                                       drop(guard)          (reverted)
//! ```
//!
//! A snapshot reflects exactly the values current at capture time; later
//! changes on the origin thread are not picked up. Applying installs the
//! captured values as a new nested layer on the calling thread. Guards must
//! be released in reverse order of application.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use super::accessor::{DynAccessor, ErasedValue};
use super::registry::ContextRegistry;
use crate::error::PropagationError;

struct Entry {
    accessor: Arc<dyn DynAccessor>,
    value: ErasedValue,
}

/// Immutable capture of the values of a set of accessors.
///
/// Cheap to clone and safe to send to other threads.
#[derive(Clone, Default)]
pub struct ContextSnapshot {
    entries: Arc<Vec<Entry>>,
}

impl ContextSnapshot {
    /// Capture every registered accessor that currently holds a value.
    pub fn capture_all(registry: &ContextRegistry) -> Result<Self, PropagationError> {
        Self::capture_all_using(|_| true, registry)
    }

    /// Capture the accessors whose key satisfies `predicate`.
    ///
    /// Accessors with no current value are skipped, so applying the snapshot
    /// leaves them untouched on the destination thread.
    pub fn capture_all_using(
        predicate: impl Fn(&str) -> bool,
        registry: &ContextRegistry,
    ) -> Result<Self, PropagationError> {
        let accessors = registry.accessors();
        let mut entries = Vec::with_capacity(accessors.len());
        for accessor in accessors.iter() {
            if !predicate(accessor.accessor_key()) {
                continue;
            }
            if let Some(value) = accessor.capture()? {
                entries.push(Entry {
                    accessor: Arc::clone(accessor),
                    value,
                });
            }
        }
        Ok(Self {
            entries: Arc::new(entries),
        })
    }

    /// Keys of the captured values.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.accessor.accessor_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install the captured values on the calling thread.
    ///
    /// The returned guard restores the previous values when closed or
    /// dropped. If an accessor fails part way through, the values installed
    /// so far are reverted before the error is returned.
    pub fn set_thread_locals(&self) -> Result<SnapshotScope, PropagationError> {
        let mut scope = SnapshotScope {
            installed: Vec::with_capacity(self.entries.len()),
            _not_send: PhantomData,
        };
        for entry in self.entries.iter() {
            let previous = entry.accessor.install(&entry.value)?;
            scope.installed.push((Arc::clone(&entry.accessor), previous));
        }
        Ok(scope)
    }

    /// Wrap `f` so it runs with this snapshot applied.
    pub fn wrap<T>(self, f: impl FnOnce() -> T) -> impl FnOnce() -> Result<T, PropagationError> {
        move || {
            let _scope = self.set_thread_locals()?;
            Ok(f())
        }
    }

    /// Wrap `future` so every poll runs with this snapshot applied.
    ///
    /// The snapshot is applied and reverted around each poll, so the wrapped
    /// future may migrate between worker threads. Scopes opened inside the
    /// future must not be held across an `.await`.
    pub fn wrap_future<F: Future>(self, future: F) -> ContextFuture<F> {
        ContextFuture {
            snapshot: self,
            inner: Box::pin(future),
        }
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// Guard returned by [`ContextSnapshot::set_thread_locals`].
///
/// Bound to the thread it was created on.
#[must_use = "dropping the guard reverts the snapshot immediately"]
pub struct SnapshotScope {
    installed: Vec<(Arc<dyn DynAccessor>, Option<ErasedValue>)>,
    _not_send: PhantomData<*const ()>,
}

impl SnapshotScope {
    /// Revert explicitly, reporting the first accessor failure.
    ///
    /// Every accessor is reverted even if an earlier one fails.
    pub fn close(mut self) -> Result<(), PropagationError> {
        self.revert_all()
    }

    fn revert_all(&mut self) -> Result<(), PropagationError> {
        let mut first_error = None;
        while let Some((accessor, previous)) = self.installed.pop() {
            if let Err(e) = accessor.revert(previous) {
                tracing::warn!(
                    key = accessor.accessor_key(),
                    error = %e,
                    "Failed to restore thread-local value"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for SnapshotScope {
    fn drop(&mut self) {
        // Failures were already logged by revert_all.
        let _ = self.revert_all();
    }
}

impl fmt::Debug for SnapshotScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotScope")
            .field("installed", &self.installed.len())
            .finish()
    }
}

/// Future returned by [`ContextSnapshot::wrap_future`].
#[must_use = "futures do nothing unless polled"]
pub struct ContextFuture<F> {
    snapshot: ContextSnapshot,
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for ContextFuture<F> {
    type Output = Result<F::Output, PropagationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let _scope = match this.snapshot.set_thread_locals() {
            Ok(scope) => scope,
            Err(e) => return Poll::Ready(Err(e)),
        };
        this.inner.as_mut().poll(cx).map(Ok)
    }
}

impl<F> fmt::Debug for ContextFuture<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFuture")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}
