//! Maps observations onto `tracing` spans.
//!
//! Each observation gets one span, created on start and stored in its
//! context. The span's parent is the parent observation's span when there is
//! one, otherwise the span that is current on the starting thread. Opening a
//! scope enters the span; closing it exits. Because scopes are strictly
//! nested per thread, enters and exits stay balanced for the subscriber.

use tracing::{field, Span};

use crate::context::Context;
use crate::event::Event;
use crate::handler::ObservationHandler;

const TARGET: &str = "sightline::span";

/// The span of an observation, stored in its [`Context`] while it runs.
#[derive(Debug, Clone)]
pub struct ObservationSpan(Span);

impl ObservationSpan {
    pub fn span(&self) -> &Span {
        &self.0
    }
}

/// Opens a `tracing` span per observation.
///
/// Must be registered with the same subscriber active on every thread that
/// opens scopes for the observation, which is the normal case for a global
/// subscriber.
#[derive(Debug, Default)]
pub struct TracingSpanHandler;

impl TracingSpanHandler {
    pub fn new() -> Self {
        Self
    }

    fn parent_span(context: &Context) -> Option<tracing::Id> {
        context
            .parent_observation()?
            .with_context(|parent| parent.get::<ObservationSpan>().and_then(|s| s.0.id()))
            .flatten()
    }
}

impl ObservationHandler for TracingSpanHandler {
    fn supports_context(&self, _context: &Context) -> bool {
        true
    }

    fn on_start(&self, context: &mut Context) {
        let span = match Self::parent_span(context) {
            Some(parent) => tracing::info_span!(
                target: TARGET,
                parent: parent,
                "observation",
                observation = context.name(),
                contextual_name = context.contextual_name(),
                kind = %context.kind().map(|k| k.to_string()).unwrap_or_default(),
                tags = field::Empty,
                high_cardinality_tags = field::Empty,
                error = field::Empty
            ),
            None => tracing::info_span!(
                target: TARGET,
                "observation",
                observation = context.name(),
                contextual_name = context.contextual_name(),
                kind = %context.kind().map(|k| k.to_string()).unwrap_or_default(),
                tags = field::Empty,
                high_cardinality_tags = field::Empty,
                error = field::Empty
            ),
        };
        context.put(ObservationSpan(span));
    }

    fn on_error(&self, context: &mut Context) {
        let Some(ObservationSpan(span)) = context.get::<ObservationSpan>() else {
            return;
        };
        let message = context.error().map(ToString::to_string).unwrap_or_default();
        span.record("error", true);
        tracing::error!(target: TARGET, parent: span, error = %message, "observation failed");
    }

    fn on_event(&self, event: &Event, context: &mut Context) {
        if let Some(ObservationSpan(span)) = context.get::<ObservationSpan>() {
            tracing::info!(
                target: TARGET,
                parent: span,
                event = event.name(),
                "{}",
                event.contextual_name()
            );
        }
    }

    fn on_scope_opened(&self, context: &mut Context) {
        if let Some(ObservationSpan(span)) = context.get::<ObservationSpan>() {
            span.with_subscriber(|(id, dispatch)| dispatch.enter(id));
        }
    }

    fn on_scope_closed(&self, context: &mut Context) {
        if let Some(ObservationSpan(span)) = context.get::<ObservationSpan>() {
            span.with_subscriber(|(id, dispatch)| dispatch.exit(id));
        }
    }

    fn on_scope_reset(&self, context: &mut Context) {
        self.on_scope_closed(context);
    }

    fn on_stop(&self, context: &mut Context) {
        let Some(ObservationSpan(span)) = context.remove::<ObservationSpan>() else {
            return;
        };
        span.record("contextual_name", context.contextual_name());
        span.record(
            "tags",
            field::display(context.low_cardinality_key_values()),
        );
        span.record(
            "high_cardinality_tags",
            field::display(context.high_cardinality_key_values()),
        );
        // The subscriber closes the span once this last handle drops.
    }
}
