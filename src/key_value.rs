//! Key/value tags attached to an observation context.
//!
//! Low-cardinality values are safe to use as metric dimensions; high-cardinality
//! values (ids, full URIs) are only meant for traces and logs.

use std::borrow::Cow;
use std::fmt;

/// A single key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue {
    key: Cow<'static, str>,
    value: String,
}

impl KeyValue {
    /// Create a new tag.
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}='{}'", self.key, self.value)
    }
}

/// An ordered set of tags, sorted by key with at most one value per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues {
    entries: Vec<KeyValue>,
}

impl KeyValues {
    /// Create an empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace a tag. The last value written for a key wins.
    pub fn insert(&mut self, key_value: KeyValue) {
        match self
            .entries
            .binary_search_by(|kv| kv.key().cmp(key_value.key()))
        {
            Ok(idx) => self.entries[idx] = key_value,
            Err(idx) => self.entries.insert(idx, key_value),
        }
    }

    /// Builder-style variant of [`KeyValues::insert`].
    #[must_use]
    pub fn and(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        self.insert(KeyValue::new(key, value));
        self
    }

    /// Look up the value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .binary_search_by(|kv| kv.key().cmp(key))
            .ok()
            .map(|idx| self.entries[idx].value())
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Extend<KeyValue> for KeyValues {
    fn extend<I: IntoIterator<Item = KeyValue>>(&mut self, iter: I) {
        for kv in iter {
            self.insert(kv);
        }
    }
}

impl FromIterator<KeyValue> for KeyValues {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        let mut values = Self::empty();
        values.extend(iter);
        values
    }
}

impl fmt::Display for KeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, kv) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", kv)?;
        }
        f.write_str("]")
    }
}

impl<'a> IntoIterator for &'a KeyValues {
    type Item = &'a KeyValue;
    type IntoIter = std::slice::Iter<'a, KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
