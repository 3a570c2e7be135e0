//! The mutable data carrier attached to every observation.
//!
//! A [`Context`] holds the observation name, tags, the terminal error, an
//! optional protocol carrier (e.g. an outgoing request) and a type-keyed
//! store that handlers use for their own per-observation state:
//!
//! ```text
//! Context
//!   ├── name, contextual_name
//!   ├── low/high cardinality KeyValues
//!   ├── parent (weak link to the parent observation)
//!   ├── error (set by Observation::error)
//!   ├── carrier + propagation (set by transport binders, before start)
//!   └── entries: TypeId -> handler-private state
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::key_value::{KeyValue, KeyValues};
use crate::observation::{Observation, WeakObservation};
use crate::transport::{Kind, Propagation};

/// Shared handle to the error recorded on an observation.
pub type ObservationError = Arc<dyn Error + Send + Sync + 'static>;

/// Data carrier for one observation.
#[derive(Default)]
pub struct Context {
    name: Option<String>,
    contextual_name: Option<String>,
    parent: Option<WeakObservation>,
    error: Option<ObservationError>,
    low_cardinality: KeyValues,
    high_cardinality: KeyValues,
    kind: Option<Kind>,
    carrier: Option<Box<dyn Any + Send + Sync>>,
    response: Option<Box<dyn Any + Send + Sync>>,
    propagation: Option<Propagation>,
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Create an empty context. The name is assigned when the observation
    /// is created.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Display name override, falling back to [`Context::name`].
    pub fn contextual_name(&self) -> &str {
        self.contextual_name.as_deref().unwrap_or_else(|| self.name())
    }

    pub fn set_contextual_name(&mut self, contextual_name: impl Into<String>) {
        self.contextual_name = Some(contextual_name.into());
    }

    /// The parent observation, if one was linked and is still alive.
    pub fn parent_observation(&self) -> Option<Observation> {
        self.parent.as_ref().and_then(WeakObservation::upgrade)
    }

    pub(crate) fn set_parent(&mut self, parent: Option<WeakObservation>) {
        self.parent = parent;
    }

    pub(crate) fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn error(&self) -> Option<&ObservationError> {
        self.error.as_ref()
    }

    pub(crate) fn set_error(&mut self, error: ObservationError) {
        self.error = Some(error);
    }

    pub fn low_cardinality_key_values(&self) -> &KeyValues {
        &self.low_cardinality
    }

    pub fn high_cardinality_key_values(&self) -> &KeyValues {
        &self.high_cardinality
    }

    pub fn add_low_cardinality_key_value(&mut self, key_value: KeyValue) {
        self.low_cardinality.insert(key_value);
    }

    pub fn add_high_cardinality_key_value(&mut self, key_value: KeyValue) {
        self.high_cardinality.insert(key_value);
    }

    /// Transport kind, if this context was built by a transport binder.
    pub fn kind(&self) -> Option<Kind> {
        self.kind
    }

    /// Install the protocol carrier. Binders call this once, before start.
    pub fn set_carrier<C: Any + Send + Sync>(&mut self, carrier: C) {
        self.carrier = Some(Box::new(carrier));
    }

    pub fn carrier<C: Any>(&self) -> Option<&C> {
        self.carrier.as_deref().and_then(|c| c.downcast_ref())
    }

    pub fn carrier_mut<C: Any>(&mut self) -> Option<&mut C> {
        self.carrier.as_deref_mut().and_then(|c| c.downcast_mut())
    }

    pub fn set_response<R: Any + Send + Sync>(&mut self, response: R) {
        self.response = Some(Box::new(response));
    }

    pub fn response<R: Any>(&self) -> Option<&R> {
        self.response.as_deref().and_then(|r| r.downcast_ref())
    }

    pub(crate) fn set_propagation(&mut self, kind: Kind, propagation: Propagation) {
        self.kind = Some(kind);
        self.propagation = Some(propagation);
    }

    /// Write a propagated key/value into the carrier.
    ///
    /// Returns `false` when this is not a sender context or no carrier is set.
    pub fn inject(&mut self, key: &str, value: &str) -> bool {
        match (&self.propagation, self.carrier.as_deref_mut()) {
            (Some(Propagation::Sender(setter)), Some(carrier)) => {
                setter(carrier, key, value);
                true
            }
            _ => false,
        }
    }

    /// Read a propagated value from the carrier of a receiver context.
    pub fn extract(&self, key: &str) -> Option<String> {
        match (&self.propagation, self.carrier.as_deref()) {
            (Some(Propagation::Receiver(getter)), Some(carrier)) => getter(carrier, key),
            _ => None,
        }
    }

    /// Store handler-private state. Replaces any previous value of the same type.
    pub fn put<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.entries
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast().ok().map(|b| *b))
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut())
    }

    /// Return the stored value, inserting one built by `f` if absent.
    pub fn get_or_insert_with<T: Any + Send + Sync>(&mut self, f: impl FnOnce() -> T) -> &mut T {
        self.entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(f()))
            .downcast_mut()
            .unwrap_or_else(|| unreachable!("entry keyed by TypeId of {}", type_name::<T>()))
    }

    pub fn remove<T: Any>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok().map(|b| *b))
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name())
            .field("contextual_name", &self.contextual_name())
            .field("error", &self.error.as_ref().map(ToString::to_string))
            .field("low_cardinality", &self.low_cardinality)
            .field("high_cardinality", &self.high_cardinality)
            .field("kind", &self.kind)
            .field("has_carrier", &self.carrier.is_some())
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TimerState(u64);

    #[test]
    fn test_contextual_name_falls_back_to_name() {
        let mut ctx = Context::new();
        ctx.set_name("http.client.requests".into());
        assert_eq!(ctx.contextual_name(), "http.client.requests");

        ctx.set_contextual_name("GET /users");
        assert_eq!(ctx.contextual_name(), "GET /users");
        assert_eq!(ctx.name(), "http.client.requests");
    }

    #[test]
    fn test_typed_entries() {
        let mut ctx = Context::new();
        assert!(ctx.get::<TimerState>().is_none());

        assert_eq!(ctx.put(TimerState(1)), None);
        assert_eq!(ctx.put(TimerState(2)), Some(TimerState(1)));
        assert_eq!(ctx.get::<TimerState>(), Some(&TimerState(2)));

        ctx.get_mut::<TimerState>().unwrap().0 = 3;
        assert_eq!(ctx.remove::<TimerState>(), Some(TimerState(3)));
        assert!(!ctx.contains::<TimerState>());
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut ctx = Context::new();
        ctx.get_or_insert_with(|| TimerState(7)).0 += 1;
        ctx.get_or_insert_with(|| TimerState(100)).0 += 1;
        assert_eq!(ctx.get::<TimerState>(), Some(&TimerState(9)));
    }

    #[test]
    fn test_carrier_downcast() {
        let mut ctx = Context::new();
        ctx.set_carrier(vec![("host", "example.com")]);

        assert!(ctx.carrier::<String>().is_none());
        assert_eq!(ctx.carrier::<Vec<(&str, &str)>>().unwrap().len(), 1);
    }

    #[test]
    fn test_inject_without_propagation() {
        let mut ctx = Context::new();
        ctx.set_carrier(String::new());
        assert!(!ctx.inject("traceparent", "00-abc"));
        assert_eq!(ctx.extract("traceparent"), None);
    }

    #[test]
    fn test_key_values() {
        let mut ctx = Context::new();
        ctx.add_low_cardinality_key_value(KeyValue::new("method", "GET"));
        ctx.add_high_cardinality_key_value(KeyValue::new("uri", "/users/42"));

        assert_eq!(ctx.low_cardinality_key_values().get("method"), Some("GET"));
        assert_eq!(
            ctx.high_cardinality_key_values().get("uri"),
            Some("/users/42")
        );
    }
}
