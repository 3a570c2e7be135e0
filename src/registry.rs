//! Observation registry: handler configuration plus per-thread current scope.
//!
//! # Configuration
//!
//! Handlers, predicates and filters are registered at startup through
//! [`ObservationRegistry::observation_config`]. The configuration lives in an
//! [`ArcSwap`], so creating an observation costs one lock-free load; each
//! observation keeps the configuration it was created with. Changing the
//! handler set while observations are in flight is not supported.
//!
//! # Current scope
//!
//! "Current" is strictly per execution context: each OS thread keeps its own
//! innermost open scope per registry. Nothing crosses a thread boundary
//! unless it is carried explicitly by a
//! [`ContextSnapshot`](crate::propagation::ContextSnapshot).

use arc_swap::ArcSwap;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::context::Context;
use crate::handler::ObservationHandler;
use crate::observation::{Observation, ObservationScope};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL: OnceLock<ObservationRegistry> = OnceLock::new();

static NOOP: OnceLock<ObservationRegistry> = OnceLock::new();

thread_local! {
    /// Innermost open scope per registry id on this thread.
    static CURRENT_SCOPES: RefCell<Vec<(u64, ObservationScope)>> = const { RefCell::new(Vec::new()) };
}

/// Decides whether an observation should be created at all.
pub trait ObservationPredicate: Send + Sync {
    fn test(&self, name: &str, context: &Context) -> bool;
}

impl<F> ObservationPredicate for F
where
    F: Fn(&str, &Context) -> bool + Send + Sync,
{
    fn test(&self, name: &str, context: &Context) -> bool {
        self(name, context)
    }
}

/// Mutates a context just before `on_stop` is dispatched.
pub trait ObservationFilter: Send + Sync {
    fn map(&self, context: &mut Context);
}

impl<F> ObservationFilter for F
where
    F: Fn(&mut Context) + Send + Sync,
{
    fn map(&self, context: &mut Context) {
        self(context)
    }
}

/// Frozen registry configuration.
#[derive(Clone, Default)]
pub struct ObservationConfig {
    pub(crate) handlers: Vec<Arc<dyn ObservationHandler>>,
    pub(crate) predicates: Vec<Arc<dyn ObservationPredicate>>,
    pub(crate) filters: Vec<Arc<dyn ObservationFilter>>,
}

impl ObservationConfig {
    /// Registered handlers, in dispatch order.
    pub fn handlers(&self) -> &[Arc<dyn ObservationHandler>] {
        &self.handlers
    }

    /// All predicates must accept the observation for it to be enabled.
    pub fn is_observation_enabled(&self, name: &str, context: &Context) -> bool {
        self.predicates.iter().all(|p| p.test(name, context))
    }
}

impl fmt::Debug for ObservationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationConfig")
            .field("handlers", &self.handlers.len())
            .field("predicates", &self.predicates.len())
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// Builder-style editor returned by [`ObservationRegistry::observation_config`].
pub struct ObservationConfigEditor<'a> {
    registry: &'a ObservationRegistry,
}

impl ObservationConfigEditor<'_> {
    /// Register a handler. Dispatch order is registration order.
    pub fn observation_handler<H>(self, handler: H) -> Self
    where
        H: ObservationHandler + 'static,
    {
        self.shared_observation_handler(Arc::new(handler))
    }

    /// Register a handler that is also referenced elsewhere.
    pub fn shared_observation_handler(self, handler: Arc<dyn ObservationHandler>) -> Self {
        self.update(|config| config.handlers.push(Arc::clone(&handler)));
        self
    }

    /// Register a predicate that can suppress observation creation.
    pub fn observation_predicate<P>(self, predicate: P) -> Self
    where
        P: ObservationPredicate + 'static,
    {
        let predicate: Arc<dyn ObservationPredicate> = Arc::new(predicate);
        self.update(|config| config.predicates.push(Arc::clone(&predicate)));
        self
    }

    /// Register a filter applied to every context before `on_stop`.
    pub fn observation_filter<F>(self, filter: F) -> Self
    where
        F: ObservationFilter + 'static,
    {
        let filter: Arc<dyn ObservationFilter> = Arc::new(filter);
        self.update(|config| config.filters.push(Arc::clone(&filter)));
        self
    }

    fn update(&self, mut edit: impl FnMut(&mut ObservationConfig)) {
        self.registry.inner.config.rcu(|current| {
            let mut next = ObservationConfig::clone(current);
            edit(&mut next);
            next
        });
    }
}

struct RegistryInner {
    id: u64,
    noop: bool,
    config: ArcSwap<ObservationConfig>,
}

/// Holds handler configuration and tracks the current observation scope.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct ObservationRegistry {
    inner: Arc<RegistryInner>,
}

impl ObservationRegistry {
    /// Create an empty registry. It stays effectively no-op until a handler
    /// is registered.
    pub fn create() -> Self {
        Self::with_noop(false)
    }

    fn with_noop(noop: bool) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
                noop,
                config: ArcSwap::from_pointee(ObservationConfig::default()),
            }),
        }
    }

    /// Registry for which every observation is disabled.
    pub fn noop() -> Self {
        NOOP.get_or_init(|| Self::with_noop(true)).clone()
    }

    /// Process-wide default registry, for call sites that want zero
    /// configuration. Everything else should pass a registry explicitly.
    pub fn global() -> &'static ObservationRegistry {
        GLOBAL.get_or_init(Self::create)
    }

    /// Edit the configuration. Intended for startup only.
    pub fn observation_config(&self) -> ObservationConfigEditor<'_> {
        ObservationConfigEditor { registry: self }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<ObservationConfig> {
        self.inner.config.load_full()
    }

    /// True when observations created against this registry are disabled.
    pub fn is_noop(&self) -> bool {
        self.inner.noop || self.inner.config.load().handlers.is_empty()
    }

    /// Configuration to attach to a new observation, or `None` if disabled.
    pub(crate) fn active_config(&self) -> Option<Arc<ObservationConfig>> {
        if self.inner.noop {
            return None;
        }
        let config = self.inner.config.load_full();
        (!config.handlers.is_empty()).then_some(config)
    }

    /// The observation of the innermost open scope on this thread.
    pub fn current_observation(&self) -> Option<Observation> {
        self.current_observation_scope()
            .map(|scope| scope.observation().clone())
    }

    /// The innermost open scope on this thread.
    pub fn current_observation_scope(&self) -> Option<ObservationScope> {
        let id = self.inner.id;
        CURRENT_SCOPES
            .try_with(|slots| {
                slots
                    .borrow()
                    .iter()
                    .find(|(owner, _)| *owner == id)
                    .map(|(_, scope)| scope.clone())
            })
            .ok()
            .flatten()
    }

    /// Install `scope` as current on this thread (or clear it).
    pub(crate) fn set_current_observation_scope(&self, scope: Option<ObservationScope>) {
        let id = self.inner.id;
        let displaced = CURRENT_SCOPES
            .try_with(|slots| {
                let mut slots = slots.borrow_mut();
                let pos = slots.iter().position(|(owner, _)| *owner == id);
                match (pos, scope) {
                    (Some(idx), Some(scope)) => Some(std::mem::replace(&mut slots[idx].1, scope)),
                    (Some(idx), None) => Some(slots.swap_remove(idx).1),
                    (None, Some(scope)) => {
                        slots.push((id, scope));
                        None
                    }
                    (None, None) => None,
                }
            })
            .ok()
            .flatten();
        // Dropped outside the borrow: releasing the last handle may run
        // handler state destructors.
        drop(displaced);
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }
}

impl PartialEq for ObservationRegistry {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ObservationRegistry {}

impl fmt::Debug for ObservationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRegistry")
            .field("id", &self.inner.id)
            .field("noop", &self.inner.noop)
            .field("config", &**self.inner.config.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Accepting;

    impl ObservationHandler for Accepting {
        fn supports_context(&self, _context: &Context) -> bool {
            true
        }
    }

    fn registry() -> ObservationRegistry {
        let registry = ObservationRegistry::create();
        registry.observation_config().observation_handler(Accepting);
        registry
    }

    #[test]
    fn test_empty_registry_is_noop() {
        let registry = ObservationRegistry::create();
        assert!(registry.is_noop());

        registry.observation_config().observation_handler(Accepting);
        assert!(!registry.is_noop());
    }

    #[test]
    fn test_noop_registry_ignores_handlers() {
        let registry = ObservationRegistry::noop();
        registry.observation_config().observation_handler(Accepting);
        assert!(registry.is_noop());
        assert!(Observation::create_started("job", &registry).is_noop());
    }

    #[test]
    fn test_config_editor_chains() {
        let registry = ObservationRegistry::create();
        registry
            .observation_config()
            .observation_handler(Accepting)
            .observation_handler(Accepting)
            .observation_predicate(|_: &str, _: &Context| true)
            .observation_filter(|_: &mut Context| {});

        let config = registry.config();
        assert_eq!(config.handlers().len(), 2);
        assert_eq!(config.predicates.len(), 1);
        assert_eq!(config.filters.len(), 1);
    }

    #[test]
    fn test_current_scope_is_per_registry() {
        let a = registry();
        let b = registry();

        let obs = Observation::create_started("on-a", &a);
        let _scope = obs.open_scope();

        assert_eq!(a.current_observation(), Some(obs.clone()));
        assert!(b.current_observation().is_none());
    }

    #[test]
    fn test_current_scope_is_per_thread() {
        let registry = registry();
        let obs = Observation::create_started("main", &registry);
        let _scope = obs.open_scope();

        let seen = std::thread::scope(|s| {
            s.spawn(|| registry.current_observation())
                .join()
                .unwrap()
        });

        assert!(seen.is_none());
        assert_eq!(registry.current_observation(), Some(obs.clone()));
    }

    #[test]
    fn test_global_is_shared() {
        assert_eq!(ObservationRegistry::global(), ObservationRegistry::global());
        assert_ne!(*ObservationRegistry::global(), ObservationRegistry::create());
    }
}
