//! Local Store Module
//!
//! Bounded in-process map with TTL expiry, set collections and
//! set-if-absent. Serves as the fallback behind the shared backend, as the
//! L1 tier, and as the storage of [`MemoryBackend`](super::MemoryBackend).

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::cache::{CacheEntry, InsertionOrder, KeyPattern, KeyTtl};

// == Local Store ==
/// In-process key/value map with oldest-insertion eviction.
///
/// Set members name value keys. Members whose value is swept or evicted
/// are dropped with it, and a set left empty goes too, so tag sets never
/// outgrow the value capacity.
#[derive(Debug)]
pub struct LocalStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Set collections (tag memberships)
    sets: HashMap<String, BTreeSet<String>>,
    /// Insertion order of `entries`, used for eviction
    order: InsertionOrder,
    /// Maximum number of value entries allowed
    max_entries: usize,
    /// Number of entries dropped to make room
    evictions: u64,
}

impl LocalStore {
    // == Constructor ==
    /// Creates a new LocalStore bounded to `max_entries` values.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            sets: HashMap::new(),
            order: InsertionOrder::new(),
            max_entries: max_entries.max(1),
            evictions: 0,
        }
    }

    // == Set ==
    /// Stores a serialized value, overwriting any previous value and TTL.
    ///
    /// When the store is full and `key` is new, the oldest inserted entry
    /// is dropped first.
    pub fn set(&mut self, key: &str, value: String, ttl: Option<Duration>) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_one();
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        self.order.record(key);
    }

    // == Set If Absent ==
    /// Stores `value` only when no live entry exists for `key`.
    ///
    /// Returns true when the value was written.
    pub fn set_if_absent(&mut self, key: &str, value: String, ttl: Option<Duration>) -> bool {
        if self.live_entry(key).is_some() {
            return false;
        }
        self.set(key, value, ttl);
        true
    }

    // == Get ==
    /// Retrieves a value by key. Expired entries are removed and reported absent.
    pub fn get(&mut self, key: &str) -> Option<String> {
        self.live_entry(key).map(|entry| entry.value.clone())
    }

    // == TTL ==
    pub fn ttl(&mut self, key: &str) -> KeyTtl {
        let is_set = self.sets.contains_key(key);
        match self.live_entry(key) {
            Some(entry) => match entry.ttl_remaining() {
                Some(remaining) => KeyTtl::Remaining(remaining),
                None => KeyTtl::NoExpiry,
            },
            None if is_set => KeyTtl::NoExpiry,
            None => KeyTtl::Missing,
        }
    }

    // == Delete ==
    /// Removes a value or set by key. Returns true if something live was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let value_removed = match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(key);
                !entry.is_expired()
            }
            None => false,
        };
        let set_removed = self.sets.remove(key).is_some();
        value_removed || set_removed
    }

    /// Deletes `key` only while it still holds `expected`. Returns whether
    /// it was deleted.
    pub fn delete_if_equals(&mut self, key: &str, expected: &str) -> bool {
        let holds = self
            .live_entry(key)
            .is_some_and(|entry| entry.value == expected);
        holds && self.delete(key)
    }

    // == Delete Matching ==
    /// Removes every key matching `pattern`, returning the keys removed.
    pub fn delete_matching(&mut self, pattern: &KeyPattern) -> Vec<String> {
        self.keys(pattern)
            .into_iter()
            .filter(|key| self.delete(key))
            .collect()
    }

    // == Keys ==
    /// Returns live keys (values and sets) matching `pattern`.
    pub fn keys(&self, pattern: &KeyPattern) -> Vec<String> {
        let values = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, _)| key);
        values
            .chain(self.sets.keys())
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect()
    }

    // == Sets ==
    /// Adds `member` to the set stored at `key`.
    pub fn set_add(&mut self, key: &str, member: &str) {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
    }

    pub fn set_members(&self, key: &str) -> Vec<String> {
        self.sets
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.sets.clear();
        self.order.clear();
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and the set memberships that pointed at
    /// them. Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.order.remove(key);
        }

        let entries = &self.entries;
        self.sets.retain(|_, members| {
            members.retain(|member| entries.contains_key(member));
            !members.is_empty()
        });
        expired.len()
    }

    /// Number of live value entries.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of set collections held.
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    fn live_entry(&mut self, key: &str) -> Option<&CacheEntry> {
        if self.entries.get(key).is_some_and(CacheEntry::is_expired) {
            self.entries.remove(key);
            self.order.remove(key);
        }
        self.entries.get(key)
    }

    fn evict_one(&mut self) {
        while let Some(oldest) = self.order.evict_oldest() {
            if self.entries.remove(&oldest).is_some() {
                self.evictions += 1;
                self.forget_member(&oldest);
                return;
            }
        }
    }

    fn forget_member(&mut self, member: &str) {
        self.sets.retain(|_, members| {
            members.remove(member);
            !members.is_empty()
        });
    }
}
