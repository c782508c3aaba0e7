//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cached results.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::group::Group;

/// Spawns a background task that periodically purges expired results.
///
/// Lookups already drop expired entries lazily; the sweep additionally
/// releases entries nobody asks for again and fires the eviction callback
/// for them. Each sweep takes the group's guard in shared mode, so it waits
/// behind a pending `clear` like any other call.
///
/// # Arguments
/// * `group` - Shared group whose current store is swept
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort it.
///
/// # Example
/// ```ignore
/// let group = Arc::new(Group::<String, u64, String>::new(1000, None, ttl));
/// let cleanup_handle = spawn_cleanup_task(group.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<K, V, E>(
    group: Arc<Group<K, V, E>>,
    interval: Duration,
) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting TTL cleanup task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = group.purge_expired().await;

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
