//! Point-in-time events signalled on a running observation.

use std::borrow::Cow;

/// An arbitrary event that happened while an observation was running,
/// e.g. "cache miss" or "retry".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    name: Cow<'static, str>,
    contextual_name: Option<Cow<'static, str>>,
}

impl Event {
    /// Create an event whose contextual name equals its name.
    pub fn of(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            contextual_name: None,
        }
    }

    /// Create an event with a separate display name.
    pub fn with_contextual_name(
        name: impl Into<Cow<'static, str>>,
        contextual_name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            name: name.into(),
            contextual_name: Some(contextual_name.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name, falling back to [`Event::name`].
    pub fn contextual_name(&self) -> &str {
        self.contextual_name.as_deref().unwrap_or(&self.name)
    }
}
