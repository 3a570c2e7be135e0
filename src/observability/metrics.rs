//! OpenTelemetry metrics pipeline.
//!
//! Installs an SDK meter provider as the global provider. Readings are kept
//! in a manual reader; wiring an exporter is left to the application, which
//! can install its own provider before calling [`init_metrics`].

use opentelemetry::global;
use opentelemetry::metrics::Meter;
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Instrumentation scope name of the crate meter.
pub const METER_NAME: &str = "sightline";

static METER: OnceLock<Meter> = OnceLock::new();

/// Initialize the metrics pipeline and return the crate meter.
///
/// This should be called once at startup. Subsequent calls return the same
/// meter.
pub fn init_metrics() -> &'static Meter {
    METER.get_or_init(|| {
        let reader = ManualReader::builder().build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        global::set_meter_provider(provider);
        tracing::debug!(meter = METER_NAME, "Metrics pipeline initialized");
        global::meter(METER_NAME)
    })
}

/// The crate meter, if [`init_metrics`] has run.
pub fn meter() -> Option<&'static Meter> {
    METER.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        let first = init_metrics() as *const Meter;
        let second = init_metrics() as *const Meter;
        assert_eq!(first, second);
        assert!(meter().is_some());
    }
}
