//! Periodic registry reconciliation and keep-alive pings.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::registry::SessionRegistry;

/// Spawn the registry sweep task.
///
/// Every `interval` the task pings all registered sessions and runs
/// [`SessionRegistry::sweep`] to re-admit orphaned connections and evict
/// stale entries. Runs until `cancel` is triggered.
pub fn start_sweep(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Registry sweep stopping");
                    break;
                }
                _ = ticker.tick() => {
                    registry.ping_all().await;
                    let (readmitted, evicted) = registry.sweep().await;
                    let sessions = registry.session_count().await;
                    tracing::debug!(sessions, readmitted, evicted, "Registry sweep tick");
                }
            }
        }
    })
}
