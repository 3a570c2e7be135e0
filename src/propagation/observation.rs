//! Accessor for the current observation.
//!
//! Installing a captured observation opens a fresh scope on the calling
//! thread, so the destination sees the same observation (and, through its
//! context, the same parent) with a scope chain of its own. Restoring closes
//! that scope, which reinstalls whatever the thread had before.

use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::accessor::ThreadLocalAccessor;
use crate::error::PropagationError;
use crate::observation::{Observation, ObservationScope};
use crate::registry::ObservationRegistry;

static GLOBAL: OnceLock<ObservationThreadLocalAccessor> = OnceLock::new();

/// Propagates the current observation of a bound [`ObservationRegistry`].
///
/// Cloning yields a handle sharing the same binding, so a clone registered in
/// a [`ContextRegistry`](super::ContextRegistry) picks up a registry bound
/// later through any other handle.
#[derive(Clone, Default)]
pub struct ObservationThreadLocalAccessor {
    registry: Arc<ArcSwapOption<ObservationRegistry>>,
}

impl ObservationThreadLocalAccessor {
    pub const KEY: &'static str = "sightline.observation";

    /// An unbound accessor. Every call that touches the registry fails
    /// until [`set_observation_registry`](Self::set_observation_registry)
    /// is called.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: ObservationRegistry) -> Self {
        let accessor = Self::new();
        accessor.set_observation_registry(registry);
        accessor
    }

    /// Process-wide default instance, unbound until configured.
    pub fn global() -> &'static ObservationThreadLocalAccessor {
        GLOBAL.get_or_init(Self::new)
    }

    pub fn set_observation_registry(&self, registry: ObservationRegistry) {
        self.registry.store(Some(Arc::new(registry)));
    }

    pub fn observation_registry(&self) -> Option<ObservationRegistry> {
        self.registry.load_full().map(|r| ObservationRegistry::clone(&r))
    }

    fn bound(&self) -> Result<ObservationRegistry, PropagationError> {
        self.observation_registry()
            .ok_or_else(|| PropagationError::RegistryNotBound {
                key: Self::KEY.to_string(),
            })
    }
}

impl ThreadLocalAccessor for ObservationThreadLocalAccessor {
    type Value = Observation;

    fn key(&self) -> &str {
        Self::KEY
    }

    fn get_value(&self) -> Result<Option<Observation>, PropagationError> {
        Ok(self.bound()?.current_observation())
    }

    /// Opens a scope that is closed by the matching [`restore`](Self::restore).
    fn set_value(&self, value: Observation) -> Result<(), PropagationError> {
        let registry = self.bound()?;
        if !value.is_noop() {
            // Owned by the registry's current slot until restore closes it.
            let _frame = ObservationScope::open(value, &registry);
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), PropagationError> {
        if let Some(scope) = self.bound()?.current_observation_scope() {
            scope.reset();
        }
        Ok(())
    }

    fn restore(&self, previous: Option<Observation>) -> Result<(), PropagationError> {
        let registry = self.bound()?;
        if let Some(scope) = registry.current_observation_scope() {
            scope.close();
        }
        if let Some(previous) = previous.filter(|p| !p.is_noop()) {
            if registry.current_observation().as_ref() != Some(&previous) {
                tracing::debug!(
                    observation = ?previous.name(),
                    "Reopening scope for restored observation"
                );
                let _frame = ObservationScope::open(previous, &registry);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ObservationThreadLocalAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationThreadLocalAccessor")
            .field("key", &Self::KEY)
            .field("bound", &self.registry.load().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::ObservationHandler;

    struct Accepting;

    impl ObservationHandler for Accepting {
        fn supports_context(&self, _context: &Context) -> bool {
            true
        }
    }

    fn bound() -> (ObservationRegistry, ObservationThreadLocalAccessor) {
        let registry = ObservationRegistry::create();
        registry.observation_config().observation_handler(Accepting);
        let accessor = ObservationThreadLocalAccessor::with_registry(registry.clone());
        (registry, accessor)
    }

    #[test]
    fn test_unbound_accessor_fails_fast() {
        let accessor = ObservationThreadLocalAccessor::new();

        for err in [
            accessor.get_value().unwrap_err(),
            accessor.reset().unwrap_err(),
            accessor.restore(Some(Observation::noop())).unwrap_err(),
        ] {
            assert!(err.to_string().contains("must be supplied"));
        }
    }

    #[test]
    fn test_binding_is_shared_between_clones() {
        let accessor = ObservationThreadLocalAccessor::new();
        let registered = accessor.clone();

        accessor.set_observation_registry(ObservationRegistry::create());
        assert!(registered.get_value().is_ok());
    }

    #[test]
    fn test_set_value_and_restore() {
        let (registry, accessor) = bound();
        let obs = Observation::create_started("job", &registry);

        assert_eq!(accessor.get_value().unwrap(), None);
        accessor.set_value(obs.clone()).unwrap();
        assert_eq!(accessor.get_value().unwrap(), Some(obs.clone()));

        accessor.restore(None).unwrap();
        assert_eq!(accessor.get_value().unwrap(), None);
    }

    #[test]
    fn test_restore_reopens_previous_when_chain_was_reset() {
        let (registry, accessor) = bound();
        let outer = Observation::create_started("outer", &registry);
        let inner = Observation::create_started("inner", &registry);

        let _scope = outer.open_scope();
        accessor.set_value(inner).unwrap();
        accessor.reset().unwrap();
        assert_eq!(registry.current_observation(), None);

        accessor.restore(Some(outer.clone())).unwrap();
        assert_eq!(registry.current_observation(), Some(outer.clone()));
        accessor.restore(None).unwrap();
    }

    #[test]
    fn test_reset_clears_current() {
        let (registry, accessor) = bound();
        let obs = Observation::create_started("job", &registry);

        accessor.set_value(obs).unwrap();
        accessor.reset().unwrap();
        assert_eq!(registry.current_observation(), None);
    }
}
