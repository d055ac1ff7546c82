//! Self-expiring key/value store
//!
//! Backs the exchange's pending-reply table. Entries age from their last
//! touch; a periodic sweep (not a per-entry timer) drains whatever has
//! gone stale. The map never invokes callbacks itself; expired entries
//! are handed back to the owner, which keeps correlation state consistent
//! even if an owner-side callback panics.

use core_types::{Duration, Instant};
use std::collections::HashMap;
use std::hash::Hash;

struct TimedEntry<V> {
    value: V,
    touched_at: Instant,
    timeout: Duration,
}

/// An entry drained by [`TimeoutMap::expire`]
pub struct ExpiredEntry<K, V> {
    pub key: K,
    pub value: V,
    pub timeout: Duration,
}

/// Key/value store whose entries expire after inactivity
pub struct TimeoutMap<K, V> {
    entries: HashMap<K, TimedEntry<V>>,
}

impl<K: Eq + Hash + Clone, V> TimeoutMap<K, V> {
    /// Creates an empty map
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Inserts an entry with its own timeout, touched at `now`
    ///
    /// Returns the previous value if the key was already present.
    pub fn insert(&mut self, key: K, value: V, timeout: Duration, now: Instant) -> Option<V> {
        self.entries
            .insert(
                key,
                TimedEntry {
                    value,
                    touched_at: now,
                    timeout,
                },
            )
            .map(|entry| entry.value)
    }

    /// Refreshes an entry's age; returns whether it exists
    pub fn touch(&mut self, key: &K, now: Instant) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touched_at = now;
                true
            }
            None => false,
        }
    }

    /// Removes and returns an entry
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Checks for a key without refreshing it
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every entry whose timeout has elapsed at `now`
    pub fn expire(&mut self, now: Instant) -> Vec<ExpiredEntry<K, V>> {
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.touched_at) >= entry.timeout)
            .map(|(key, _)| key.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|key| {
                self.entries.remove(&key).map(|entry| ExpiredEntry {
                    key,
                    value: entry.value,
                    timeout: entry.timeout,
                })
            })
            .collect()
    }

    /// Removes and returns every entry, expired or not
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.entries
            .drain()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }
}

impl<K: Eq + Hash + Clone, V> Default for TimeoutMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
