//! Group Module
//!
//! Combines the deduplication coordinator with a replaceable result cache.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CacheStats, CacheStore, EvictCallback};
use crate::config::Config;
use crate::error::Result;
use crate::flight::{Coordinator, Outcome};

// == Group ==
/// Deduplicated calls with a bounded TTL/LRU cache of successful results.
///
/// The store sits behind a readers-writer guard: every [`Group::call`]
/// holds it in shared mode for its whole duration, while [`Group::clear`]
/// takes it exclusively to swap in a fresh store. The coordinator lives
/// outside the guard, so clearing never disturbs an in-flight execution.
pub struct Group<K, V, E> {
    /// Current store; the inner mutex serializes LRU bookkeeping
    store: RwLock<Mutex<CacheStore<K, V>>>,
    capacity: usize,
    ttl: Duration,
    on_evict: Option<EvictCallback<K, V>>,
    flights: Coordinator<K, V, E>,
}

impl<K, V, E> fmt::Debug for Group<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("on_evict", &self.on_evict.is_some())
            .field("flights", &self.flights)
            .finish_non_exhaustive()
    }
}

impl<K, V, E> Group<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a new Group.
    ///
    /// # Arguments
    /// * `capacity` - Maximum cached results, 0 turns LRU eviction off
    /// * `on_evict` - Optional callback fired for every evicted result
    /// * `ttl` - Result lifetime, zero turns expiration off
    pub fn new(capacity: usize, on_evict: Option<EvictCallback<K, V>>, ttl: Duration) -> Self {
        Self {
            store: RwLock::new(Mutex::new(CacheStore::new(
                capacity,
                ttl,
                on_evict.clone(),
            ))),
            capacity,
            ttl,
            on_evict,
            flights: Coordinator::new(),
        }
    }

    /// Creates a new Group from configuration.
    pub fn from_config(config: &Config, on_evict: Option<EvictCallback<K, V>>) -> Self {
        Self::new(config.capacity, on_evict, config.ttl)
    }

    // == Call ==
    /// Returns the result of `producer` for `key`, running it at most once
    /// across concurrent callers.
    ///
    /// With `use_cache`, a cached result is returned without running
    /// anything (reported as shared), and a successful execution is cached
    /// afterwards. Failed executions are never cached. Without `use_cache`
    /// the cache is neither read nor written.
    ///
    /// The producer receives a token that is cancelled only when every
    /// caller waiting on the execution has cancelled. Cancelling `ctx` only
    /// abandons this caller's wait.
    pub async fn call<F, Fut>(
        &self,
        ctx: &CancellationToken,
        key: K,
        use_cache: bool,
        producer: F,
    ) -> Result<Outcome<V>, E>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        let store = self.store.read().await;

        if use_cache {
            if let Some(value) = store.lock().await.get(&key) {
                debug!("Serving cached result");
                return Ok(Outcome {
                    value,
                    shared: true,
                });
            }
        }

        let cache_key = use_cache.then(|| key.clone());
        let outcome = self.flights.execute(key, ctx, producer).await?;

        if let Some(key) = cache_key {
            // Resolved through the guard held since the start of the call
            store.lock().await.insert(key, outcome.value.clone());
        }

        Ok(outcome)
    }

    // == Clear ==
    /// Replaces the cache with an empty one.
    ///
    /// Waits for calls currently holding the guard and holds off new ones
    /// until the swap is done. Entries of the old store are dropped without
    /// firing the eviction callback. In-flight executions are untouched.
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        *store = Mutex::new(self.new_store());
        info!("Cache cleared");
    }

    // == Purge Expired ==
    /// Removes expired results from the current store.
    ///
    /// Returns the number of entries removed.
    pub async fn purge_expired(&self) -> usize {
        let store = self.store.read().await;
        let removed = store.lock().await.purge_expired();
        removed
    }

    /// Statistics of the current store; they restart from zero after a clear.
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        let stats = store.lock().await.stats();
        stats
    }

    /// Number of results in the current store.
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        let len = store.lock().await.len();
        len
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of executions currently in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn new_store(&self) -> CacheStore<K, V> {
        CacheStore::new(self.capacity, self.ttl, self.on_evict.clone())
    }
}
