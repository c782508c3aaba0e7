//! Flightcache - per-key call deduplication with a bounded result cache
//!
//! Concurrent callers asking for the same key share one producer execution,
//! and successful results can be kept in a TTL/LRU cache so later callers
//! skip the producer entirely.

pub mod cache;
pub mod config;
pub mod error;
pub mod flight;
pub mod group;
pub mod tasks;

pub use cache::{CacheStats, CacheStore, EvictCallback};
pub use config::Config;
pub use error::GroupError;
pub use flight::{Coordinator, Outcome};
pub use group::Group;
pub use tasks::spawn_cleanup_task;
pub use tokio_util::sync::CancellationToken;
