//! Observations: named units of work with a start/scope/stop lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! create_not_started ──► parent_observation / key values (optional)
//!        │
//!      start ───────────► on_start
//!        │
//!   open_scope ─────────► on_scope_opened   (any number of times,
//!   Scope drop/close ───► on_scope_closed    strictly nested per thread)
//!        │
//!   error / event ──────► on_error / on_event
//!        │
//!      stop ────────────► filters, then on_stop
//! ```
//!
//! Transitions are monotonic (created → started → stopped) and each fires at
//! most once; repeated or out-of-order calls are ignored and logged.
//!
//! An [`Observation`] is a cheap, cloneable handle. A disabled observation
//! (see [`Observation::noop`]) accepts every call and does nothing, so
//! instrumented code never has to branch on whether observation is enabled.

pub mod scope;

pub use scope::{ObservationScope, Scope};

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::context::{Context, ObservationError};
use crate::event::Event;
use crate::handler::{dispatch, Signal};
use crate::key_value::KeyValue;
use crate::registry::{ObservationConfig, ObservationRegistry};

const CREATED: u8 = 0;
const STARTED: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle state of an enabled observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Started,
    Stopped,
}

impl Lifecycle {
    fn from_raw(raw: u8) -> Self {
        match raw {
            CREATED => Lifecycle::Created,
            STARTED => Lifecycle::Started,
            _ => Lifecycle::Stopped,
        }
    }
}

pub(crate) struct ObservationInner {
    registry: ObservationRegistry,
    config: Arc<ObservationConfig>,
    state: AtomicU8,
    context: Mutex<Context>,
}

impl ObservationInner {
    fn lock_context(&self) -> MutexGuard<'_, Context> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_raw(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Clone)]
enum State {
    Disabled,
    Active(Arc<ObservationInner>),
}

/// Handle to an observation.
///
/// Equality is identity: two handles are equal when they refer to the same
/// observation (all disabled handles are equal to each other).
#[derive(Clone)]
pub struct Observation {
    state: State,
}

/// Shared disabled observation, handed out by no-op scopes.
pub(crate) static NOOP: Observation = Observation::NOOP;

impl Observation {
    /// The disabled observation.
    pub const NOOP: Observation = Observation {
        state: State::Disabled,
    };

    /// A disabled observation: every operation is a cheap no-op.
    #[must_use]
    pub const fn noop() -> Self {
        Self::NOOP
    }

    /// Create an observation that has not been started yet.
    ///
    /// Returns a disabled observation when the registry is a no-op registry,
    /// has no handlers, or any registered predicate rejects the observation.
    pub fn create_not_started(name: impl Into<String>, registry: &ObservationRegistry) -> Self {
        Self::create_not_started_with(name, Context::new, registry)
    }

    /// Like [`Observation::create_not_started`] with a binder-supplied context.
    ///
    /// The supplier is only invoked when observation is enabled.
    pub fn create_not_started_with<F>(
        name: impl Into<String>,
        context: F,
        registry: &ObservationRegistry,
    ) -> Self
    where
        F: FnOnce() -> Context,
    {
        let Some(config) = registry.active_config() else {
            return Self::NOOP;
        };

        let mut ctx = context();
        ctx.set_name(name.into());
        if !config.is_observation_enabled(ctx.name(), &ctx) {
            return Self::NOOP;
        }

        Self {
            state: State::Active(Arc::new(ObservationInner {
                registry: registry.clone(),
                config,
                state: AtomicU8::new(CREATED),
                context: Mutex::new(ctx),
            })),
        }
    }

    /// Create and immediately start an observation.
    pub fn create_started(name: impl Into<String>, registry: &ObservationRegistry) -> Self {
        Self::create_not_started(name, registry).start()
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.state, State::Disabled)
    }

    /// Lifecycle state, or `None` for a disabled observation.
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        match &self.state {
            State::Disabled => None,
            State::Active(inner) => Some(inner.lifecycle()),
        }
    }

    /// Link a parent observation. Must be called before [`Observation::start`];
    /// the link is immutable afterwards.
    #[must_use]
    pub fn parent_observation(self, parent: &Observation) -> Self {
        if let State::Active(inner) = &self.state {
            if inner.lifecycle() == Lifecycle::Created {
                inner.lock_context().set_parent(parent.downgrade());
            } else {
                tracing::warn!(
                    observation = %inner.lock_context().name(),
                    "Ignoring parent link on an observation that was already started"
                );
            }
        }
        self
    }

    #[must_use]
    pub fn contextual_name(self, contextual_name: impl Into<String>) -> Self {
        if let State::Active(inner) = &self.state {
            inner.lock_context().set_contextual_name(contextual_name);
        }
        self
    }

    #[must_use]
    pub fn low_cardinality_key_value(self, key_value: KeyValue) -> Self {
        if let State::Active(inner) = &self.state {
            inner.lock_context().add_low_cardinality_key_value(key_value);
        }
        self
    }

    #[must_use]
    pub fn high_cardinality_key_value(self, key_value: KeyValue) -> Self {
        if let State::Active(inner) = &self.state {
            inner.lock_context().add_high_cardinality_key_value(key_value);
        }
        self
    }

    /// Start the observation and notify handlers.
    ///
    /// If no parent was linked, the registry's current observation (if any)
    /// becomes the parent.
    #[must_use]
    pub fn start(self) -> Self {
        if let State::Active(inner) = &self.state {
            if !inner.transition(CREATED, STARTED) {
                tracing::debug!(
                    observation = %inner.lock_context().name(),
                    "Observation already started"
                );
                return self;
            }

            let current = inner.registry.current_observation();
            let mut ctx = inner.lock_context();
            if !ctx.has_parent() {
                if let Some(current) = current.filter(|c| c != &self) {
                    ctx.set_parent(current.downgrade());
                }
            }
            dispatch(&inner.config.handlers, Signal::Start, &mut ctx);
        }
        self
    }

    /// Make this observation current in the calling execution context.
    ///
    /// The returned guard restores the previous scope when closed or dropped.
    pub fn open_scope(&self) -> Scope {
        match &self.state {
            State::Disabled => Scope::noop(),
            State::Active(inner) => {
                if inner.lifecycle() == Lifecycle::Created {
                    tracing::warn!(
                        observation = %inner.lock_context().name(),
                        "Opening a scope on an observation that was not started"
                    );
                }
                Scope::new(ObservationScope::open(self.clone(), &inner.registry))
            }
        }
    }

    /// Record an error and notify handlers.
    pub fn error(&self, error: impl Into<Box<dyn Error + Send + Sync + 'static>>) {
        if let State::Active(inner) = &self.state {
            let error: ObservationError = Arc::from(error.into());
            let mut ctx = inner.lock_context();
            ctx.set_error(error);
            dispatch(&inner.config.handlers, Signal::Error, &mut ctx);
        }
    }

    /// Signal an arbitrary event.
    pub fn event(&self, event: Event) {
        if let State::Active(inner) = &self.state {
            let mut ctx = inner.lock_context();
            dispatch(&inner.config.handlers, Signal::Event(&event), &mut ctx);
        }
    }

    /// Stop the observation: run filters, then notify handlers.
    ///
    /// Scopes derived from this observation should be closed first.
    pub fn stop(&self) {
        if let State::Active(inner) = &self.state {
            if !inner.transition(STARTED, STOPPED) {
                tracing::warn!(
                    observation = %inner.lock_context().name(),
                    state = ?inner.lifecycle(),
                    "Ignoring stop on an observation that is not running"
                );
                return;
            }

            let mut ctx = inner.lock_context();
            for filter in &inner.config.filters {
                filter.map(&mut ctx);
            }
            dispatch(&inner.config.handlers, Signal::Stop, &mut ctx);
        }
    }

    /// Start, run `f` in a scope, then stop.
    ///
    /// The scope is closed and the observation stopped even if `f` panics;
    /// the panic is recorded as the observation's error.
    pub fn observe<T>(self, f: impl FnOnce() -> T) -> T {
        let observation = self.start();
        let _stop = StopOnDrop(&observation);
        let _scope = observation.open_scope();
        f()
    }

    /// Like [`Observation::observe`] for fallible work: an `Err` is recorded
    /// (by its display message) before the observation stops.
    pub fn observe_checked<T, E>(self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: fmt::Display,
    {
        let observation = self.start();
        let _stop = StopOnDrop(&observation);
        let _scope = observation.open_scope();
        let result = f();
        if let Err(e) = &result {
            observation.error(e.to_string());
        }
        result
    }

    /// Run `f` with this observation current, without starting or stopping it.
    pub fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        let _scope = self.open_scope();
        f()
    }

    /// Read the context. Returns `None` for a disabled observation.
    ///
    /// Must not be called from inside a handler callback for the same
    /// observation; handlers receive the context directly.
    pub fn with_context<R>(&self, f: impl FnOnce(&Context) -> R) -> Option<R> {
        match &self.state {
            State::Disabled => None,
            State::Active(inner) => Some(f(&inner.lock_context())),
        }
    }

    /// Mutate the context, e.g. to set a response before stopping.
    pub fn with_context_mut<R>(&self, f: impl FnOnce(&mut Context) -> R) -> Option<R> {
        match &self.state {
            State::Disabled => None,
            State::Active(inner) => Some(f(&mut inner.lock_context())),
        }
    }

    /// Observation name, or `None` for a disabled observation.
    pub fn name(&self) -> Option<String> {
        self.with_context(|ctx| ctx.name().to_string())
    }

    /// The parent observation, if linked and still alive.
    pub fn parent(&self) -> Option<Observation> {
        self.with_context(Context::parent_observation).flatten()
    }

    /// The registry this observation was created against.
    pub fn registry(&self) -> Option<&ObservationRegistry> {
        match &self.state {
            State::Disabled => None,
            State::Active(inner) => Some(&inner.registry),
        }
    }

    /// A non-owning link to this observation.
    pub fn downgrade(&self) -> Option<WeakObservation> {
        match &self.state {
            State::Disabled => None,
            State::Active(inner) => Some(WeakObservation(Arc::downgrade(inner))),
        }
    }

    /// Dispatch a scope-related signal.
    pub(crate) fn notify(&self, signal: Signal<'_>) {
        if let State::Active(inner) = &self.state {
            let mut ctx = inner.lock_context();
            dispatch(&inner.config.handlers, signal, &mut ctx);
        }
    }
}

impl PartialEq for Observation {
    fn eq(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (State::Disabled, State::Disabled) => true,
            (State::Active(a), State::Active(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Observation {}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Disabled => f.write_str("Observation(noop)"),
            State::Active(inner) => {
                let mut s = f.debug_struct("Observation");
                match inner.context.try_lock() {
                    Ok(ctx) => s.field("name", &ctx.name()),
                    Err(_) => s.field("name", &"<in use>"),
                };
                s.field("lifecycle", &inner.lifecycle()).finish()
            }
        }
    }
}

/// Non-owning link to an observation, used for parent back-references.
#[derive(Clone)]
pub struct WeakObservation(Weak<ObservationInner>);

impl WeakObservation {
    pub fn upgrade(&self) -> Option<Observation> {
        self.0.upgrade().map(|inner| Observation {
            state: State::Active(inner),
        })
    }
}

impl fmt::Debug for WeakObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakObservation")
    }
}

/// Stops the observation when dropped, recording a panic as its error.
struct StopOnDrop<'a>(&'a Observation);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.error("observed code panicked");
        }
        self.0.stop();
    }
}
