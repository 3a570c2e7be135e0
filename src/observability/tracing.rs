//! `tracing` subscriber setup for applications embedding sightline.
//!
//! The library itself only emits events; installing a subscriber is the
//! application's call. These helpers install one that suits the crate's
//! output:
//! - [`LoggingHandler`](crate::handler::logging::LoggingHandler) events under
//!   the `sightline::observation` target
//! - [`TracingSpanHandler`](crate::handler::span::TracingSpanHandler) spans
//!   and error events under `sightline::span`
//! - misuse diagnostics (double start, unbalanced scopes) under `sightline`
//! - thread names and ids on every line, since scopes are per thread

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter applied when neither RUST_LOG nor a caller default is usable.
pub const DEFAULT_FILTER: &str = "warn,sightline=info";

/// Install the global subscriber.
///
/// RUST_LOG wins; otherwise `default_filter` is used, falling back to
/// [`DEFAULT_FILTER`] if it does not parse. Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = default_filter, "Tracing initialized");
    }
    installed
}

/// Error-only subscriber writing through the test harness. Safe to call
/// from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
