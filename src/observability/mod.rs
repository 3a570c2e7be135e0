//! Observability infrastructure for the crate's own diagnostics.
//!
//! Provides:
//! - Structured `tracing` subscriber setup
//! - The OpenTelemetry meter used by [`MeterHandler`](crate::handler::metrics::MeterHandler)

pub mod metrics;
pub mod tracing;
