//! Enrichment property set
//!
//! An insertion-ordered string → JSON value map with add-if-absent
//! semantics. Enrichers run in priority order, so the first writer of a key
//! wins and later (lower-priority) enrichers can never overwrite it.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::HashMap;

/// Ordered set of enrichment properties attached to a log event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertySet {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl PropertySet {
    /// Create an empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property unless the key is already present.
    ///
    /// Returns `true` when the value was inserted.
    pub fn add_if_absent(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value.into()));
        true
    }

    /// Add an optional property; `None` adds nothing.
    pub fn add_opt<V: Into<Value>>(&mut self, key: impl Into<String>, value: Option<V>) -> bool {
        match value {
            Some(v) => self.add_if_absent(key, v),
            None => false,
        }
    }

    /// Get a property value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Get a property as a string slice, if it is a JSON string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Properties sorted by key
    pub fn sorted(&self) -> Vec<(&str, &Value)> {
        let mut items: Vec<_> = self.iter().collect();
        items.sort_by(|a, b| a.0.cmp(b.0));
        items
    }

    /// Merge another set into this one with add-if-absent semantics
    pub fn merge(&mut self, other: PropertySet) {
        for (key, value) in other.entries {
            self.add_if_absent(key, value);
        }
    }
}

impl Serialize for PropertySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for PropertySet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = PropertySet::new();
        for (k, v) in iter {
            set.add_if_absent(k, v);
        }
        set
    }
}
