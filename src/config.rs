//! Configuration Module
//!
//! Handles loading group configuration from environment variables.

use std::env;
use std::time::Duration;

/// Group configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of cached results, 0 = unbounded
    pub capacity: usize,
    /// Lifetime of a cached result, zero = never expires
    pub ttl: Duration,
    /// Interval between background sweeps of expired entries
    pub cleanup_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `FLIGHTCACHE_CAPACITY` - Maximum cached results (default: 1000)
    /// - `FLIGHTCACHE_TTL_MS` - Result lifetime in milliseconds (default: 300000)
    /// - `FLIGHTCACHE_CLEANUP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: parse_var("FLIGHTCACHE_CAPACITY").unwrap_or(defaults.capacity),
            ttl: parse_var("FLIGHTCACHE_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ttl),
            cleanup_interval: parse_var("FLIGHTCACHE_CLEANUP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_interval),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(1),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
