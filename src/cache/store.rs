//! Cache Store Module
//!
//! Main cache engine combining LRU-ordered storage with TTL expiration.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tracing::trace;

use crate::cache::{CacheEntry, CacheStats};

/// Callback invoked with every entry removed by capacity or TTL eviction.
///
/// Runs synchronously on the thread that triggered the eviction while the
/// store is locked. It must not call back into the store or its group.
pub type EvictCallback<K, V> = Arc<dyn Fn(K, V) + Send + Sync>;

// == Cache Store ==
/// Bounded key-value storage with LRU eviction and TTL expiration.
///
/// A `capacity` of 0 disables capacity eviction; a zero `ttl` disables
/// expiration.
pub struct CacheStore<K, V> {
    /// Key-value storage in recency order; capacity is enforced here, not
    /// by the `LruCache`, so expired entries can be purged first
    entries: LruCache<K, CacheEntry<V>>,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of live entries, 0 = unbounded
    capacity: usize,
    /// Maximum residency of an entry, zero = forever
    ttl: Duration,
    on_evict: Option<EvictCallback<K, V>>,
}

impl<K, V> fmt::Debug for CacheStore<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .field("stats", &self.stats)
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries, 0 for unbounded
    /// * `ttl` - Time after which an entry is treated as absent, zero to disable
    /// * `on_evict` - Optional callback fired for each evicted entry
    pub fn new(capacity: usize, ttl: Duration, on_evict: Option<EvictCallback<K, V>>) -> Self {
        Self {
            entries: LruCache::unbounded(),
            stats: CacheStats::new(),
            capacity,
            ttl,
            on_evict,
        }
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// A hit marks the key as most recently used. An expired entry is
    /// removed, reported to the eviction callback and counted as a miss.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired(self.ttl),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_expired(key);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Insert ==
    /// Stores a value, overwriting any previous one for the key.
    ///
    /// Inserting refreshes both recency and insertion time. If the store
    /// then holds more than `capacity` entries, expired entries are purged
    /// first and the least recently used entry is evicted if that was not
    /// enough.
    ///
    /// Returns true if an entry was evicted to make room.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.entries.put(key, CacheEntry::new(value));

        let mut evicted = false;
        if self.over_capacity() {
            evicted = self.purge_expired() > 0;
        }
        if self.over_capacity() {
            if let Some((oldest, entry)) = self.entries.pop_lru() {
                trace!("Evicting least recently used entry");
                self.stats.record_eviction();
                self.notify_evicted(oldest, entry.value);
                evicted = true;
            }
        }

        self.stats.set_total_entries(self.entries.len());
        evicted
    }

    // == Purge Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        if self.ttl.is_zero() {
            return 0;
        }

        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_expired(key);
        }

        expired_keys.len()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn over_capacity(&self) -> bool {
        self.capacity > 0 && self.entries.len() > self.capacity
    }

    fn remove_expired(&mut self, key: &K) {
        if let Some(entry) = self.entries.pop(key) {
            trace!(age_ms = entry.age().as_millis() as u64, "Removing expired entry");
            self.stats.record_expiration();
            self.stats.set_total_entries(self.entries.len());
            self.notify_evicted(key.clone(), entry.value);
        }
    }

    fn notify_evicted(&self, key: K, value: V) {
        if let Some(on_evict) = &self.on_evict {
            on_evict(key, value);
        }
    }
}
