//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries, so stale
//! bytes are released even for keys that are never requested again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::fetch::Fetcher;

/// Spawns a task that calls [`Fetcher::evict_expired`] every `interval`.
///
/// The returned handle is aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let sweep = spawn_expiry_task(fetcher.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_expiry_task(fetcher: Fetcher, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting expiry sweep task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = fetcher.evict_expired().await;
            if removed > 0 {
                info!(removed, "Expiry sweep removed expired entries");
            } else {
                debug!("Expiry sweep: nothing expired");
            }
        }
    })
}
