//! OpenTelemetry metrics for observations.
//!
//! Instruments:
//! - `observation.duration`: histogram of start-to-stop time in seconds
//! - `observation.active`: up/down counter of running observations
//! - `observation.events`: counter of signalled events
//!
//! Attributes are the observation name plus its low-cardinality key values;
//! duration additionally carries `error`.

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue as Attribute;
use std::time::Instant;

use crate::context::Context;
use crate::event::Event;
use crate::handler::ObservationHandler;

/// Per-observation timing state kept in the context.
struct Timing {
    started: Instant,
    attributes: Vec<Attribute>,
}

/// Records observation metrics through an OpenTelemetry [`Meter`].
#[derive(Debug)]
pub struct MeterHandler {
    duration: Histogram<f64>,
    active: UpDownCounter<i64>,
    events: Counter<u64>,
}

impl MeterHandler {
    pub fn new(meter: &Meter) -> Self {
        Self {
            duration: meter
                .f64_histogram("observation.duration")
                .with_description("Time between observation start and stop")
                .with_unit("s")
                .init(),
            active: meter
                .i64_up_down_counter("observation.active")
                .with_description("Observations started but not yet stopped")
                .with_unit("1")
                .init(),
            events: meter
                .u64_counter("observation.events")
                .with_description("Events signalled on running observations")
                .with_unit("1")
                .init(),
        }
    }

    /// Handler over the crate meter, installing the metrics pipeline if needed.
    pub fn global() -> Self {
        Self::new(crate::observability::metrics::init_metrics())
    }

    fn attributes(context: &Context) -> Vec<Attribute> {
        std::iter::once(Attribute::new("observation.name", context.name().to_string()))
            .chain(
                context
                    .low_cardinality_key_values()
                    .iter()
                    .map(|kv| Attribute::new(kv.key().to_string(), kv.value().to_string())),
            )
            .collect()
    }
}

impl ObservationHandler for MeterHandler {
    fn supports_context(&self, _context: &Context) -> bool {
        true
    }

    fn on_start(&self, context: &mut Context) {
        let attributes = Self::attributes(context);
        self.active.add(1, &attributes);
        context.put(Timing {
            started: Instant::now(),
            attributes,
        });
    }

    fn on_event(&self, event: &Event, context: &mut Context) {
        self.events.add(
            1,
            &[
                Attribute::new("observation.name", context.name().to_string()),
                Attribute::new("event", event.name().to_string()),
            ],
        );
    }

    fn on_stop(&self, context: &mut Context) {
        let Some(timing) = context.remove::<Timing>() else {
            return;
        };
        // Same attributes as the increment, even if tags changed since.
        self.active.add(-1, &timing.attributes);

        let mut attributes = Self::attributes(context);
        attributes.push(Attribute::new("error", context.error().is_some()));
        self.duration
            .record(timing.started.elapsed().as_secs_f64(), &attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_value::KeyValue;
    use crate::observation::Observation;
    use crate::registry::ObservationRegistry;
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};

    fn handler() -> MeterHandler {
        let provider = SdkMeterProvider::builder()
            .with_reader(ManualReader::builder().build())
            .build();
        MeterHandler::new(&provider.meter("sightline-test"))
    }

    #[test]
    fn test_timing_state_lifecycle() {
        let registry = ObservationRegistry::create();
        registry.observation_config().observation_handler(handler());

        let obs = Observation::create_not_started("orders.create", &registry)
            .low_cardinality_key_value(KeyValue::new("channel", "web"))
            .start();
        assert_eq!(obs.with_context(|ctx| ctx.contains::<Timing>()), Some(true));

        obs.event(Event::of("retry"));
        obs.stop();
        assert_eq!(obs.with_context(|ctx| ctx.contains::<Timing>()), Some(false));
    }

    #[test]
    fn test_attributes_include_name_and_tags() {
        let mut ctx = Context::new();
        ctx.set_name("db.query".into());
        ctx.add_low_cardinality_key_value(KeyValue::new("db.system", "postgres"));

        let keys: Vec<String> = MeterHandler::attributes(&ctx)
            .iter()
            .map(|kv| kv.key.as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["observation.name", "db.system"]);
    }

    #[test]
    fn test_global_handler() {
        let _ = MeterHandler::global();
    }
}
