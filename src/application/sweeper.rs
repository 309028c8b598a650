//! Periodic cleanup of finished calls

use super::pending::PendingCallbacks;
use crate::domain::call::CallSessionRegistry;
use crate::infrastructure::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Remove expired sessions and stale parked callbacks every `interval`
///
/// Also refreshes the active-calls gauge. Stops when `shutdown` fires.
pub fn spawn_sweeper(
    registry: Arc<CallSessionRegistry>,
    pending: Arc<PendingCallbacks>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Call sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }

            registry.sweep().await;
            let purged = pending.purge_expired().await;
            if purged > 0 {
                debug!("Discarded {} stale early callbacks", purged);
            }
            telemetry::set_active_calls(registry.active_count().await);
        }
    })
}
