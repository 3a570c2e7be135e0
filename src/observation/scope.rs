//! Scopes: LIFO frames that make an observation current on one thread.
//!
//! Opening a scope captures whatever scope was current, installs the new one
//! and notifies handlers. Closing notifies handlers and then reinstalls the
//! captured predecessor, regardless of what is current at that point, so an
//! unbalanced close cannot corrupt frames further down the chain.
//!
//! ```text
//!   open(a) ─► [a]          close(b) ─► [a]
//!   open(b) ─► [b → a]      close(a) ─► []
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::handler::Signal;
use crate::observation::Observation;
use crate::registry::ObservationRegistry;

struct ScopeInner {
    observation: Observation,
    registry: ObservationRegistry,
    previous: Option<ObservationScope>,
    closed: AtomicBool,
}

/// One frame of the per-thread scope chain.
///
/// This is the value stored as "current" by the registry. Application code
/// normally holds a [`Scope`] guard instead; the raw frame is exposed for
/// hierarchy introspection and for propagation accessors.
///
/// Frames belong to the thread that opened them and cannot be sent to
/// another one:
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<sightline::ObservationScope>();
/// ```
#[derive(Clone)]
pub struct ObservationScope {
    inner: Arc<ScopeInner>,
    _not_send: PhantomData<*const ()>,
}

impl ObservationScope {
    /// Install a new frame for `observation` on the calling thread.
    pub(crate) fn open(observation: Observation, registry: &ObservationRegistry) -> Self {
        let previous = registry.current_observation_scope();
        let scope = Self {
            inner: Arc::new(ScopeInner {
                observation,
                registry: registry.clone(),
                previous,
                closed: AtomicBool::new(false),
            }),
            _not_send: PhantomData,
        };
        registry.set_current_observation_scope(Some(scope.clone()));
        let undo = UndoOpen(&scope);
        scope.inner.observation.notify(Signal::ScopeOpened);
        std::mem::forget(undo);
        scope
    }

    /// The observation this frame makes current.
    pub fn observation(&self) -> &Observation {
        &self.inner.observation
    }

    /// The frame that was current when this one was opened.
    pub fn parent(&self) -> Option<&ObservationScope> {
        self.inner.previous.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Notify handlers, then reinstall the predecessor. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if !self.is_current() {
            tracing::warn!(
                observation = ?self.inner.observation.name(),
                "Closing a scope that is not current; restoring its predecessor anyway"
            );
        }

        // Restored even if a handler panics.
        let _restore = RestorePrevious(self);
        self.inner.observation.notify(Signal::ScopeClosed);
    }

    /// Tear down the whole chain on this thread.
    ///
    /// Every open frame from the innermost current one down, and from this
    /// one down if it is not on that chain, is marked closed and its
    /// observation receives `on_scope_reset`. The registry is left with no
    /// current scope, and guards of the torn-down frames close silently.
    pub fn reset(&self) {
        let registry = &self.inner.registry;
        let _clear = ClearCurrent(registry);

        if let Some(current) = registry.current_observation_scope() {
            current.reset_chain();
        }
        self.reset_chain();
    }

    fn reset_chain(&self) {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if !scope.inner.closed.swap(true, Ordering::AcqRel) {
                scope.inner.observation.notify(Signal::ScopeReset);
            }
            frame = scope.parent();
        }
    }

    fn is_current(&self) -> bool {
        self.inner
            .registry
            .current_observation_scope()
            .is_some_and(|current| current == *self)
    }
}

impl PartialEq for ObservationScope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ObservationScope {}

impl fmt::Debug for ObservationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationScope")
            .field("observation", &self.inner.observation)
            .field("has_parent", &self.inner.previous.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct RestorePrevious<'a>(&'a ObservationScope);

impl Drop for RestorePrevious<'_> {
    fn drop(&mut self) {
        let inner = &self.0.inner;
        inner
            .registry
            .set_current_observation_scope(inner.previous.clone());
    }
}

/// Reinstalls the predecessor unless forgotten once `on_scope_opened`
/// dispatch returns, i.e. only when a handler unwinds.
struct UndoOpen<'a>(&'a ObservationScope);

impl Drop for UndoOpen<'_> {
    fn drop(&mut self) {
        let inner = &self.0.inner;
        inner.closed.store(true, Ordering::Release);
        inner
            .registry
            .set_current_observation_scope(inner.previous.clone());
    }
}

struct ClearCurrent<'a>(&'a ObservationRegistry);

impl Drop for ClearCurrent<'_> {
    fn drop(&mut self) {
        self.0.set_current_observation_scope(None);
    }
}

/// Guard returned by [`Observation::open_scope`].
///
/// Closes its frame when dropped. The guard is tied to the thread that
/// opened it and cannot be sent elsewhere; to continue an observation on
/// another thread, capture a
/// [`ContextSnapshot`](crate::propagation::ContextSnapshot).
#[must_use = "dropping the scope closes it immediately"]
pub struct Scope {
    scope: Option<ObservationScope>,
    _not_send: PhantomData<*const ()>,
}

impl Scope {
    pub(crate) fn new(scope: ObservationScope) -> Self {
        Self {
            scope: Some(scope),
            _not_send: PhantomData,
        }
    }

    pub(crate) fn noop() -> Self {
        Self {
            scope: None,
            _not_send: PhantomData,
        }
    }

    /// True for scopes of disabled observations.
    pub fn is_noop(&self) -> bool {
        self.scope.is_none()
    }

    pub fn observation(&self) -> &Observation {
        match &self.scope {
            Some(scope) => scope.observation(),
            None => &super::NOOP,
        }
    }

    /// The frame that was current when this scope was opened.
    pub fn parent(&self) -> Option<&ObservationScope> {
        self.scope.as_ref().and_then(ObservationScope::parent)
    }

    pub fn observation_scope(&self) -> Option<&ObservationScope> {
        self.scope.as_ref()
    }

    /// Close explicitly. Equivalent to dropping the guard.
    pub fn close(self) {
        drop(self);
    }

    /// Tear down every frame on this thread, see [`ObservationScope::reset`].
    pub fn reset(&self) {
        if let Some(scope) = &self.scope {
            scope.reset();
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.close();
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => scope.fmt(f),
            None => f.write_str("Scope(noop)"),
        }
    }
}
