//! Accessor SPI.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::error::PropagationError;

/// Capture/install/restore contract for one kind of thread-confined state.
///
/// Implementations are registered in a
/// [`ContextRegistry`](super::ContextRegistry) under [`key`](Self::key).
/// A [`ContextSnapshot`](super::ContextSnapshot) calls `get_value` at capture
/// time on the origin thread, and `set_value` followed later by `restore` on
/// the destination thread.
pub trait ThreadLocalAccessor: Send + Sync {
    type Value: Clone + Send + Sync + 'static;

    /// Registry key. Unique per registry.
    fn key(&self) -> &str;

    /// The value current on the calling thread, if any.
    fn get_value(&self) -> Result<Option<Self::Value>, PropagationError>;

    /// Install `value` as current on the calling thread.
    fn set_value(&self, value: Self::Value) -> Result<(), PropagationError>;

    /// Clear to the no-value state.
    fn reset(&self) -> Result<(), PropagationError>;

    /// Revert to the value observed right before the most recent `set_value`.
    fn restore(&self, previous: Option<Self::Value>) -> Result<(), PropagationError> {
        match previous {
            Some(value) => self.set_value(value),
            None => self.reset(),
        }
    }
}

pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Object-safe view of a [`ThreadLocalAccessor`], so a snapshot can hold
/// accessors of different value types.
pub(crate) trait DynAccessor: Send + Sync {
    fn accessor_key(&self) -> &str;

    fn capture(&self) -> Result<Option<ErasedValue>, PropagationError>;

    /// Install `value`, returning what was current before.
    fn install(&self, value: &ErasedValue) -> Result<Option<ErasedValue>, PropagationError>;

    fn revert(&self, previous: Option<ErasedValue>) -> Result<(), PropagationError>;
}

impl<A> DynAccessor for A
where
    A: ThreadLocalAccessor,
{
    fn accessor_key(&self) -> &str {
        self.key()
    }

    fn capture(&self) -> Result<Option<ErasedValue>, PropagationError> {
        Ok(self
            .get_value()?
            .map(|value| Arc::new(value) as ErasedValue))
    }

    fn install(&self, value: &ErasedValue) -> Result<Option<ErasedValue>, PropagationError> {
        let value = downcast::<A>(self, value)?;
        let previous = self.capture()?;
        self.set_value(value)?;
        Ok(previous)
    }

    fn revert(&self, previous: Option<ErasedValue>) -> Result<(), PropagationError> {
        let previous = previous
            .map(|value| downcast::<A>(self, &value))
            .transpose()?;
        self.restore(previous)
    }
}

fn downcast<A: ThreadLocalAccessor>(
    accessor: &A,
    value: &ErasedValue,
) -> Result<A::Value, PropagationError> {
    value
        .downcast_ref::<A::Value>()
        .cloned()
        .ok_or_else(|| PropagationError::ValueTypeMismatch {
            key: accessor.key().to_string(),
            expected: type_name::<A::Value>(),
        })
}
