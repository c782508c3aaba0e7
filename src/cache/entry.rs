//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with its value and insertion time.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Instant of the last insert (overwrites refresh it)
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current instant.
    pub fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    // == Age ==
    /// Time elapsed since the entry was inserted.
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    // == Is Expired ==
    /// Checks if the entry has outlived `ttl`.
    ///
    /// Boundary condition: an entry is expired once its age is greater than
    /// or equal to `ttl`, so a lookup exactly at `inserted_at + ttl` misses.
    /// A zero `ttl` means entries never expire.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        !ttl.is_zero() && self.age() >= ttl
    }
}
