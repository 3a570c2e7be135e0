//! Sightline: an instrumentation facade with observation lifecycles and
//! cross-thread context propagation.
//!
//! Application code wraps units of work in [`Observation`]s; pluggable
//! [`ObservationHandler`]s turn lifecycle transitions into logs, spans or
//! metrics. The "current" observation is tracked per thread, and moves to
//! another thread or task only through an explicit [`ContextSnapshot`].
//!
//! # Architecture
//!
//! - **Facade**: instrumented code depends on the observation API only
//! - **Zero cost when disabled**: a registry without handlers hands out
//!   no-op observations
//! - **Per-thread scopes**: strictly nested, restored on every exit path
//! - **Explicit propagation**: capture a snapshot, apply it elsewhere
//!
//! # Modules
//!
//! - [`observation`]: observations and scopes
//! - [`registry`]: handler configuration and the current scope
//! - [`handler`]: handler SPI and built-in handlers
//! - [`context`]: per-observation data carrier
//! - [`transport`]: contexts for remote calls (carrier injection/extraction)
//! - [`propagation`]: accessors, snapshots and executor wrappers
//! - [`observability`]: tracing and metrics setup
//!
//! # Example
//!
//! ```
//! use sightline::handler::logging::LoggingHandler;
//! use sightline::{KeyValue, Observation, ObservationRegistry};
//!
//! let registry = ObservationRegistry::create();
//! registry
//!     .observation_config()
//!     .observation_handler(LoggingHandler::new());
//!
//! let total = Observation::create_not_started("orders.checkout", &registry)
//!     .low_cardinality_key_value(KeyValue::new("channel", "web"))
//!     .observe(|| 40 + 2);
//! assert_eq!(total, 42);
//! ```

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // handler::logging::LoggingHandler is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc,      // Panic docs can be verbose
    clippy::new_without_default      // Handlers expose both where it matters
)]

pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod key_value;
pub mod observability;
pub mod observation;
pub mod propagation;
pub mod registry;
pub mod transport;

pub use context::Context;
pub use error::PropagationError;
pub use event::Event;
pub use handler::ObservationHandler;
pub use key_value::{KeyValue, KeyValues};
pub use observation::{Observation, ObservationScope, Scope};
pub use propagation::{
    ContextRegistry, ContextSnapshot, ObservationThreadLocalAccessor, ThreadLocalAccessor,
};
pub use registry::ObservationRegistry;
