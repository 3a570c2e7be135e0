//! Error types for context propagation.
//!
//! Lifecycle operations on observations never fail: misuse is tolerated and
//! logged. Only the propagation layer reports errors, and it reports them
//! loudly so that a misconfigured accessor surfaces during integration
//! instead of producing silently missing context downstream.

use thiserror::Error;

/// Error type for accessor and snapshot operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropagationError {
    /// The accessor was used before being bound to an observation registry.
    #[error(
        "accessor `{key}` has no ObservationRegistry bound: an ObservationRegistry must be \
         supplied via ObservationThreadLocalAccessor::set_observation_registry before \
         capturing or restoring observations"
    )]
    RegistryNotBound { key: String },

    /// A captured value did not have the type the accessor manages.
    #[error("value for accessor `{key}` is not of type {expected}")]
    ValueTypeMismatch { key: String, expected: &'static str },
}
