//! Logs every lifecycle transition as a `tracing` event.

use crate::context::Context;
use crate::event::Event;
use crate::handler::ObservationHandler;

/// Target used for all events emitted by [`LoggingHandler`].
pub const TARGET: &str = "sightline::observation";

/// Emits one `tracing` event per lifecycle transition.
///
/// Start, stop and events log at `INFO`, errors at `WARN` and scope
/// transitions at `TRACE`, all under the [`TARGET`] target so they can be
/// filtered independently, e.g. `RUST_LOG=sightline::observation=trace`.
pub struct LoggingHandler {
    supports: Box<dyn Fn(&Context) -> bool + Send + Sync>,
}

impl LoggingHandler {
    /// Log every observation.
    pub fn new() -> Self {
        Self {
            supports: Box::new(|_: &Context| true),
        }
    }

    /// Log only observations whose context satisfies `predicate`.
    pub fn supporting(predicate: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        Self {
            supports: Box::new(predicate),
        }
    }
}

impl Default for LoggingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationHandler for LoggingHandler {
    fn supports_context(&self, context: &Context) -> bool {
        (self.supports)(context)
    }

    fn on_start(&self, context: &mut Context) {
        tracing::info!(
            target: TARGET,
            observation = context.name(),
            contextual_name = context.contextual_name(),
            tags = %context.low_cardinality_key_values(),
            "START"
        );
    }

    fn on_error(&self, context: &mut Context) {
        tracing::warn!(
            target: TARGET,
            observation = context.name(),
            error = %context.error().map(ToString::to_string).unwrap_or_default(),
            "ERROR"
        );
    }

    fn on_event(&self, event: &Event, context: &mut Context) {
        tracing::info!(
            target: TARGET,
            observation = context.name(),
            event = event.name(),
            contextual_name = event.contextual_name(),
            "EVENT"
        );
    }

    fn on_scope_opened(&self, context: &mut Context) {
        tracing::trace!(target: TARGET, observation = context.name(), "OPEN");
    }

    fn on_scope_closed(&self, context: &mut Context) {
        tracing::trace!(target: TARGET, observation = context.name(), "CLOSE");
    }

    fn on_scope_reset(&self, context: &mut Context) {
        tracing::trace!(target: TARGET, observation = context.name(), "RESET");
    }

    fn on_stop(&self, context: &mut Context) {
        tracing::info!(
            target: TARGET,
            observation = context.name(),
            contextual_name = context.contextual_name(),
            tags = %context.low_cardinality_key_values(),
            high_cardinality_tags = %context.high_cardinality_key_values(),
            error = context.error().is_some(),
            "STOP"
        );
    }
}
