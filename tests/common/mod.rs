//! Shared handlers and helpers for integration tests.
//!
//! Provides:
//! - `RecordingHandler`: records every callback with the observation name
//! - `TrackingHandler`: keeps a per-thread stack of handler-side scopes, the
//!   way a tracing backend would
//! - Registry fixtures

#![allow(dead_code)]

use sightline::{Context, Event, ObservationHandler, ObservationRegistry};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Records "<callback>:<observation name>" for every callback.
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, callback: &str, context: &Context) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", callback, context.name()));
    }
}

impl ObservationHandler for RecordingHandler {
    fn supports_context(&self, _context: &Context) -> bool {
        true
    }

    fn on_start(&self, context: &mut Context) {
        self.record("start", context);
    }

    fn on_error(&self, context: &mut Context) {
        self.record("error", context);
    }

    fn on_event(&self, event: &Event, context: &mut Context) {
        self.record(&format!("event[{}]", event.name()), context);
    }

    fn on_scope_opened(&self, context: &mut Context) {
        self.record("open", context);
    }

    fn on_scope_closed(&self, context: &mut Context) {
        self.record("close", context);
    }

    fn on_scope_reset(&self, context: &mut Context) {
        self.record("reset", context);
    }

    fn on_stop(&self, context: &mut Context) {
        self.record("stop", context);
    }
}

static NEXT_TRACKED_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TRACKED: RefCell<Option<Arc<TrackedScope>>> = const { RefCell::new(None) };
}

/// A handler-side scope, linked to the one that was current when it opened.
#[derive(Debug)]
pub struct TrackedScope {
    pub id: u64,
    pub observation: String,
    previous: Option<Arc<TrackedScope>>,
}

impl TrackedScope {
    pub fn parent(&self) -> Option<&Arc<TrackedScope>> {
        self.previous.as_ref()
    }
}

/// Mirrors scope open/close into a per-thread stack of [`TrackedScope`]s.
pub struct TrackingHandler;

impl TrackingHandler {
    /// The innermost tracked scope on the calling thread.
    pub fn current() -> Option<Arc<TrackedScope>> {
        TRACKED.with(|t| t.borrow().clone())
    }
}

impl ObservationHandler for TrackingHandler {
    fn supports_context(&self, _context: &Context) -> bool {
        true
    }

    fn on_scope_opened(&self, context: &mut Context) {
        TRACKED.with(|t| {
            let previous = t.borrow_mut().take();
            *t.borrow_mut() = Some(Arc::new(TrackedScope {
                id: NEXT_TRACKED_ID.fetch_add(1, Ordering::Relaxed),
                observation: context.name().to_string(),
                previous,
            }));
        });
    }

    fn on_scope_closed(&self, _context: &mut Context) {
        TRACKED.with(|t| {
            let current = t.borrow_mut().take();
            *t.borrow_mut() = current.and_then(|scope| scope.previous.clone());
        });
    }

    fn on_scope_reset(&self, _context: &mut Context) {
        TRACKED.with(|t| t.borrow_mut().take());
    }
}

/// Registry with a single recording handler.
pub fn recording_registry() -> (ObservationRegistry, Arc<RecordingHandler>) {
    let recorder = RecordingHandler::new();
    let registry = ObservationRegistry::create();
    registry
        .observation_config()
        .shared_observation_handler(recorder.clone());
    (registry, recorder)
}

/// Registry with a [`TrackingHandler`].
pub fn tracking_registry() -> ObservationRegistry {
    let registry = ObservationRegistry::create();
    registry.observation_config().observation_handler(TrackingHandler);
    registry
}
