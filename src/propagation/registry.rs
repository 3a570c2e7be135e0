//! Registry of accessors spanned by snapshots.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::accessor::{DynAccessor, ThreadLocalAccessor};

static GLOBAL: OnceLock<ContextRegistry> = OnceLock::new();

type Accessors = Vec<Arc<dyn DynAccessor>>;

/// The set of accessors a [`ContextSnapshot`](super::ContextSnapshot) spans.
///
/// Cloning yields a handle to the same registry. Accessors are registered at
/// startup; capture reads the list without locking.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    accessors: Arc<ArcSwap<Accessors>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide default registry. Empty until accessors are registered.
    pub fn global() -> &'static ContextRegistry {
        GLOBAL.get_or_init(Self::new)
    }

    /// Register an accessor, replacing any accessor with the same key.
    pub fn register_thread_local_accessor<A>(&self, accessor: A) -> &Self
    where
        A: ThreadLocalAccessor + 'static,
    {
        let accessor: Arc<dyn DynAccessor> = Arc::new(accessor);
        self.accessors.rcu(|current| {
            let mut next: Accessors = current
                .iter()
                .filter(|a| a.accessor_key() != accessor.accessor_key())
                .cloned()
                .collect();
            next.push(Arc::clone(&accessor));
            next
        });
        tracing::debug!(key = accessor.accessor_key(), "Registered thread-local accessor");
        self
    }

    /// Remove the accessor registered under `key`. Returns whether one was
    /// registered.
    pub fn remove_thread_local_accessor(&self, key: &str) -> bool {
        let previous = self.accessors.rcu(|current| {
            current
                .iter()
                .filter(|a| a.accessor_key() != key)
                .cloned()
                .collect::<Accessors>()
        });
        previous.iter().any(|a| a.accessor_key() == key)
    }

    /// Registered keys, in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.accessors
            .load()
            .iter()
            .map(|a| a.accessor_key().to_string())
            .collect()
    }

    pub(crate) fn accessors(&self) -> Arc<Accessors> {
        self.accessors.load_full()
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
