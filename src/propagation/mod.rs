//! Cross-thread context propagation.
//!
//! Provides:
//! - [`ThreadLocalAccessor`]: capture/install/restore for one kind of
//!   thread-confined state
//! - [`ContextRegistry`]: the set of accessors a snapshot spans
//! - [`ContextSnapshot`]: an immutable capture that can be applied on another
//!   thread or task, returning a guard that reverts it
//! - [`ContextExecutor`]: spawns threads and tokio tasks with a snapshot
//!   applied around the work
//! - [`ObservationThreadLocalAccessor`]: the accessor for the current
//!   observation
//!
//! Nothing crosses a thread boundary implicitly: code that hands work to
//! another thread captures a snapshot at the hand-off point and applies it
//! on the other side.

pub mod accessor;
pub mod executor;
pub mod observation;
pub mod registry;
pub mod snapshot;

pub use accessor::ThreadLocalAccessor;
pub use executor::ContextExecutor;
pub use observation::ObservationThreadLocalAccessor;
pub use registry::ContextRegistry;
pub use snapshot::{ContextFuture, ContextSnapshot, SnapshotScope};
