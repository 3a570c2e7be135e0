//! Observation lifecycle through a registry with several handlers.

mod common;

use common::{recording_registry, RecordingHandler};
use sightline::handler::{AllMatchingCompositeHandler, FirstMatchingCompositeHandler};
use sightline::observation::Lifecycle;
use sightline::transport::{receiver_context, sender_context, Kind};
use sightline::{Context, Event, KeyValue, Observation, ObservationHandler, ObservationRegistry};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

type Headers = HashMap<String, String>;

/// Writes the observation name into outgoing carriers, reads it from incoming ones.
struct HeaderPropagator;

impl ObservationHandler for HeaderPropagator {
    fn supports_context(&self, context: &Context) -> bool {
        context.kind().is_some()
    }

    fn on_start(&self, context: &mut Context) {
        match context.kind() {
            Some(Kind::Client) | Some(Kind::Producer) => {
                let name = context.name().to_string();
                context.inject("x-observation", &name);
            }
            _ => {
                if let Some(upstream) = context.extract("x-observation") {
                    context.add_high_cardinality_key_value(KeyValue::new("upstream", upstream));
                }
            }
        }
    }
}

/// Panics when the named callback fires for an observation called "explosive".
struct Panicking(&'static str);

impl ObservationHandler for Panicking {
    fn supports_context(&self, context: &Context) -> bool {
        context.name() == "explosive"
    }

    fn on_start(&self, _context: &mut Context) {
        if self.0 == "start" {
            panic!("handler failed on start");
        }
    }

    fn on_scope_closed(&self, _context: &mut Context) {
        if self.0 == "close" {
            panic!("handler failed on close");
        }
    }
}

#[test]
fn test_handlers_notified_in_registration_order() {
    let first = RecordingHandler::new();
    let second = RecordingHandler::new();
    let registry = ObservationRegistry::create();
    registry
        .observation_config()
        .shared_observation_handler(first.clone())
        .shared_observation_handler(second.clone());

    Observation::create_not_started("orders.checkout", &registry).observe(|| {
        registry
            .current_observation()
            .unwrap()
            .event(Event::of("cart.validated"));
    });

    let expected = vec![
        "start:orders.checkout",
        "open:orders.checkout",
        "event[cart.validated]:orders.checkout",
        "close:orders.checkout",
        "stop:orders.checkout",
    ];
    assert_eq!(first.calls(), expected);
    assert_eq!(second.calls(), expected);
}

#[test]
fn test_panicking_handler_skips_later_handlers() {
    let recorder = RecordingHandler::new();
    let registry = ObservationRegistry::create();
    registry
        .observation_config()
        .observation_handler(Panicking("start"))
        .shared_observation_handler(recorder.clone());

    let obs = Observation::create_not_started("explosive", &registry);
    let handle = obs.clone();
    let result = catch_unwind(AssertUnwindSafe(|| obs.start()));

    assert!(result.is_err());
    // The transition was committed before dispatch.
    assert_eq!(handle.lifecycle(), Some(Lifecycle::Started));
    assert!(recorder.calls().is_empty());

    handle.stop();
    assert_eq!(recorder.calls(), vec!["stop:explosive"]);
}

#[test]
fn test_panic_on_close_still_restores_previous_scope() {
    let (registry, recorder) = recording_registry();
    registry
        .observation_config()
        .observation_handler(Panicking("close"));

    let outer = Observation::create_started("outer", &registry);
    let explosive = Observation::create_started("explosive", &registry);

    let _outer_scope = outer.open_scope();
    let result = catch_unwind(AssertUnwindSafe(|| {
        let _scope = explosive.open_scope();
    }));

    assert!(result.is_err());
    assert_eq!(registry.current_observation(), Some(outer.clone()));
    // The recorder comes first, so it saw the close before the panic.
    assert!(recorder.calls().contains(&"close:explosive".to_string()));
}

#[test]
fn test_sender_handler_injects_into_carrier() {
    let registry = ObservationRegistry::create();
    registry.observation_config().observation_handler(HeaderPropagator);

    let outgoing = Observation::create_not_started_with(
        "http.client.request",
        || {
            sender_context(Kind::Client, Headers::new(), |headers, key, value| {
                headers.insert(key.to_string(), value.to_string());
            })
        },
        &registry,
    )
    .start();

    let header = outgoing
        .with_context(|ctx| ctx.carrier::<Headers>().and_then(|h| h.get("x-observation").cloned()))
        .flatten();
    assert_eq!(header.as_deref(), Some("http.client.request"));
    outgoing.stop();

    let mut incoming_headers = Headers::new();
    incoming_headers.insert("x-observation".into(), "http.client.request".into());
    let incoming = Observation::create_not_started_with(
        "http.server.request",
        move || {
            receiver_context(Kind::Server, incoming_headers, |headers, key| {
                headers.get(key).cloned()
            })
        },
        &registry,
    )
    .start();

    let upstream = incoming
        .with_context(|ctx| {
            ctx.high_cardinality_key_values()
                .get("upstream")
                .map(str::to_string)
        })
        .flatten();
    assert_eq!(upstream.as_deref(), Some("http.client.request"));
    incoming.stop();
}

#[test]
fn test_plain_context_ignored_by_transport_handler() {
    let recorder = RecordingHandler::new();
    let registry = ObservationRegistry::create();
    registry
        .observation_config()
        .observation_handler(HeaderPropagator)
        .shared_observation_handler(recorder.clone());

    let obs = Observation::create_started("local.work", &registry);
    obs.stop();

    assert_eq!(recorder.calls(), vec!["start:local.work", "stop:local.work"]);
}

#[test]
fn test_composite_handlers_in_registry() {
    let specific = RecordingHandler::new();
    let generic = RecordingHandler::new();
    let audit = RecordingHandler::new();

    struct Only(&'static str, Arc<RecordingHandler>);

    impl ObservationHandler for Only {
        fn supports_context(&self, context: &Context) -> bool {
            context.name().starts_with(self.0)
        }

        fn on_start(&self, context: &mut Context) {
            self.1.on_start(context);
        }

        fn on_stop(&self, context: &mut Context) {
            self.1.on_stop(context);
        }
    }

    let first_matching: Vec<Arc<dyn ObservationHandler>> =
        vec![Arc::new(Only("db.", specific.clone())), generic.clone()];
    let all_matching: Vec<Arc<dyn ObservationHandler>> = vec![audit.clone()];

    let registry = ObservationRegistry::create();
    registry
        .observation_config()
        .observation_handler(FirstMatchingCompositeHandler::new(first_matching))
        .observation_handler(AllMatchingCompositeHandler::new(all_matching));

    Observation::create_started("db.query", &registry).stop();
    Observation::create_started("cache.get", &registry).stop();

    assert_eq!(specific.calls(), vec!["start:db.query", "stop:db.query"]);
    assert_eq!(generic.calls(), vec!["start:cache.get", "stop:cache.get"]);
    assert_eq!(audit.calls().len(), 4);
}

#[test]
fn test_predicate_and_filter_together() {
    let (registry, recorder) = recording_registry();
    registry
        .observation_config()
        .observation_predicate(|name: &str, _ctx: &Context| name != "noise")
        .observation_filter(|ctx: &mut Context| {
            ctx.add_low_cardinality_key_value(KeyValue::new("service", "checkout"));
        });

    let noise = Observation::create_started("noise", &registry);
    assert!(noise.is_noop());
    noise.stop();

    let signal = Observation::create_started("signal", &registry);
    signal.stop();

    let service = signal
        .with_context(|ctx| {
            ctx.low_cardinality_key_values()
                .get("service")
                .map(str::to_string)
        })
        .flatten();
    assert_eq!(service.as_deref(), Some("checkout"));
    assert_eq!(recorder.calls(), vec!["start:signal", "stop:signal"]);
}

#[test]
fn test_config_changes_apply_to_new_observations_only() {
    let (registry, first) = recording_registry();

    let early = Observation::create_started("early", &registry);

    let second = RecordingHandler::new();
    registry
        .observation_config()
        .shared_observation_handler(second.clone());

    let late = Observation::create_started("late", &registry);
    early.stop();
    late.stop();

    assert_eq!(
        first.calls(),
        vec!["start:early", "start:late", "stop:early", "stop:late"]
    );
    assert_eq!(second.calls(), vec!["start:late", "stop:late"]);
}

#[test]
fn test_nested_observe_links_parents() {
    let (registry, recorder) = recording_registry();

    let child_parent = Observation::create_not_started("request", &registry).observe(|| {
        Observation::create_not_started("db.query", &registry).observe(|| {
            registry
                .current_observation()
                .and_then(|current| current.parent())
                .and_then(|parent| parent.name())
        })
    });

    assert_eq!(child_parent.as_deref(), Some("request"));
    assert!(registry.current_observation().is_none());
    assert_eq!(
        recorder.calls(),
        vec![
            "start:request",
            "open:request",
            "start:db.query",
            "open:db.query",
            "close:db.query",
            "stop:db.query",
            "close:request",
            "stop:request",
        ]
    );
}
