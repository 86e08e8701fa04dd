//! Mirror Store Module
//!
//! Concurrent map holding the mirrored entries. Sharded locking keeps
//! operations on unrelated keys from serializing behind one lock.

use std::collections::HashMap;
use std::hash::Hash;

use dashmap::DashMap;

// == Mirror Store ==
/// Unbounded concurrent key/value store with per-key atomic operations.
///
/// Absence of a key is the only representation of "not mirrored"; the store
/// never holds tombstones.
#[derive(Debug)]
pub struct MirrorStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, V>,
}

impl<K, V> MirrorStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    // == Get ==
    /// Returns a copy of the value stored under `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    // == Delete ==
    /// Removes `key`. Returns true if an entry was present.
    pub fn delete(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Returns true if `key` is currently mirrored.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Snapshot ==
    /// Copies the current contents into a plain map.
    ///
    /// Shards are visited one at a time, so concurrent writers may be
    /// observed on some shards and not others.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<K, V> Default for MirrorStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
