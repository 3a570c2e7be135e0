//! Handler SPI: backends react to observation lifecycle transitions.
//!
//! # Dispatch
//!
//! For every lifecycle event the registry walks its handlers in registration
//! order. Each handler is asked [`ObservationHandler::supports_context`] on
//! every call; a handler that rejects a context is skipped for that dispatch
//! only. Dispatch is synchronous and completes before the triggering call
//! returns.
//!
//! A handler that panics is not isolated: the panic unwinds to the caller
//! and the remaining handlers for that event are skipped. Lifecycle state
//! and the current scope are committed or restored independently of
//! dispatch, so the core never ends up half-transitioned.
//!
//! `on_scope_closed` runs from the `Scope` guard's `Drop`. If the thread is
//! already unwinding (e.g. `observe` around code that panicked), a second
//! panic from that callback aborts the process. Handlers must not panic in
//! `on_scope_closed` or `on_scope_reset`.
//!
//! # Built-in handlers
//!
//! - [`logging::LoggingHandler`]: one `tracing` event per transition
//! - [`span::TracingSpanHandler`]: maps observations onto `tracing` spans
//! - [`metrics::MeterHandler`]: OpenTelemetry duration/active/event instruments

pub mod logging;
pub mod metrics;
pub mod span;

use std::sync::Arc;

use crate::context::Context;
use crate::event::Event;

/// Callbacks invoked on observation lifecycle transitions.
///
/// All callbacks default to no-ops so implementors override only what they
/// need.
pub trait ObservationHandler: Send + Sync {
    /// Whether this handler wants callbacks for the given context.
    fn supports_context(&self, context: &Context) -> bool;

    fn on_start(&self, _context: &mut Context) {}

    fn on_error(&self, _context: &mut Context) {}

    fn on_event(&self, _event: &Event, _context: &mut Context) {}

    fn on_scope_opened(&self, _context: &mut Context) {}

    fn on_scope_closed(&self, _context: &mut Context) {}

    /// The scope chain of the current execution context is being torn down
    /// wholesale; drop any scope tracking for this context.
    fn on_scope_reset(&self, _context: &mut Context) {}

    fn on_stop(&self, _context: &mut Context) {}
}

/// Lifecycle transitions, used by the dispatchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal<'a> {
    Start,
    Error,
    Event(&'a Event),
    ScopeOpened,
    ScopeClosed,
    ScopeReset,
    Stop,
}

impl Signal<'_> {
    pub(crate) fn deliver(self, handler: &dyn ObservationHandler, context: &mut Context) {
        match self {
            Signal::Start => handler.on_start(context),
            Signal::Error => handler.on_error(context),
            Signal::Event(event) => handler.on_event(event, context),
            Signal::ScopeOpened => handler.on_scope_opened(context),
            Signal::ScopeClosed => handler.on_scope_closed(context),
            Signal::ScopeReset => handler.on_scope_reset(context),
            Signal::Stop => handler.on_stop(context),
        }
    }
}

/// Notify every supporting handler, in order.
pub(crate) fn dispatch(
    handlers: &[Arc<dyn ObservationHandler>],
    signal: Signal<'_>,
    context: &mut Context,
) {
    for handler in handlers {
        if handler.supports_context(context) {
            signal.deliver(handler.as_ref(), context);
        }
    }
}

/// Delegates each callback to the first delegate that supports the context.
///
/// Useful when several backends can handle the same context but only one
/// should, e.g. a specialised HTTP handler registered ahead of a generic one.
pub struct FirstMatchingCompositeHandler {
    delegates: Vec<Arc<dyn ObservationHandler>>,
}

impl FirstMatchingCompositeHandler {
    pub fn new(delegates: Vec<Arc<dyn ObservationHandler>>) -> Self {
        Self { delegates }
    }

    fn forward(&self, signal: Signal<'_>, context: &mut Context) {
        if let Some(handler) = self
            .delegates
            .iter()
            .find(|h| h.supports_context(context))
        {
            signal.deliver(handler.as_ref(), context);
        }
    }
}

impl ObservationHandler for FirstMatchingCompositeHandler {
    fn supports_context(&self, context: &Context) -> bool {
        self.delegates.iter().any(|h| h.supports_context(context))
    }

    fn on_start(&self, context: &mut Context) {
        self.forward(Signal::Start, context);
    }

    fn on_error(&self, context: &mut Context) {
        self.forward(Signal::Error, context);
    }

    fn on_event(&self, event: &Event, context: &mut Context) {
        self.forward(Signal::Event(event), context);
    }

    fn on_scope_opened(&self, context: &mut Context) {
        self.forward(Signal::ScopeOpened, context);
    }

    fn on_scope_closed(&self, context: &mut Context) {
        self.forward(Signal::ScopeClosed, context);
    }

    fn on_scope_reset(&self, context: &mut Context) {
        self.forward(Signal::ScopeReset, context);
    }

    fn on_stop(&self, context: &mut Context) {
        self.forward(Signal::Stop, context);
    }
}

/// Delegates each callback to every delegate that supports the context.
pub struct AllMatchingCompositeHandler {
    delegates: Vec<Arc<dyn ObservationHandler>>,
}

impl AllMatchingCompositeHandler {
    pub fn new(delegates: Vec<Arc<dyn ObservationHandler>>) -> Self {
        Self { delegates }
    }
}

impl ObservationHandler for AllMatchingCompositeHandler {
    fn supports_context(&self, context: &Context) -> bool {
        self.delegates.iter().any(|h| h.supports_context(context))
    }

    fn on_start(&self, context: &mut Context) {
        dispatch(&self.delegates, Signal::Start, context);
    }

    fn on_error(&self, context: &mut Context) {
        dispatch(&self.delegates, Signal::Error, context);
    }

    fn on_event(&self, event: &Event, context: &mut Context) {
        dispatch(&self.delegates, Signal::Event(event), context);
    }

    fn on_scope_opened(&self, context: &mut Context) {
        dispatch(&self.delegates, Signal::ScopeOpened, context);
    }

    fn on_scope_closed(&self, context: &mut Context) {
        dispatch(&self.delegates, Signal::ScopeClosed, context);
    }

    fn on_scope_reset(&self, context: &mut Context) {
        dispatch(&self.delegates, Signal::ScopeReset, context);
    }

    fn on_stop(&self, context: &mut Context) {
        dispatch(&self.delegates, Signal::Stop, context);
    }
}
