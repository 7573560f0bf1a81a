//! Change-tracked values for JSON-encoded columns.
//!
//! # Invariants
//! - Every mutable access marks the value dirty.
//! - Values loaded from storage start clean.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

/// Free-form property map attached to terms and documents.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Value wrapper that remembers whether it was mutated since the last write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tracked<T> {
    value: T,
    #[serde(skip)]
    dirty: bool,
}

/// Tracked key/value map.
pub type TrackedMap = Tracked<PropertyMap>;

impl<T> Tracked<T> {
    /// Wraps a value in clean state.
    pub fn new(value: T) -> Self {
        Self {
            value,
            dirty: false,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutable access; marks the value dirty.
    pub fn edit(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.value
    }

    /// Swaps in a new value and returns the old one.
    pub fn replace(&mut self, value: T) -> T {
        self.dirty = true;
        std::mem::replace(&mut self.value, value)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Called after the value has been written back.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Serialize> Tracked<T> {
    /// Encodes the wrapped value as JSON column text.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.value)
    }
}

impl<T: DeserializeOwned + Default> Tracked<T> {
    /// Decodes JSON column text; `NULL` or blank text yields the default.
    pub fn from_json(text: Option<&str>) -> serde_json::Result<Self> {
        match text.map(str::trim) {
            None | Some("") => Ok(Self::new(T::default())),
            Some(raw) => serde_json::from_str(raw).map(Self::new),
        }
    }
}

impl<K: Ord, V> Tracked<BTreeMap<K, V>> {
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.edit().insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.edit().remove(key)
    }
}

impl<T> Tracked<Vec<T>> {
    pub fn push(&mut self, value: T) {
        self.edit().push(value);
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: PartialEq> PartialEq for Tracked<T> {
    /// Compares contents only; dirtiness is bookkeeping.
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> From<T> for Tracked<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
