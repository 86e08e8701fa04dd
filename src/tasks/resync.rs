//! Periodic Resync Task
//!
//! Background task that re-runs the bootstrap scan at a fixed interval, so
//! entries left stale by missed notifications eventually converge.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::format::Formatter;
use crate::Mirror;

/// Spawns a background task that periodically resynchronizes the mirror.
///
/// The first resync happens one full `every` after spawning. A failed
/// resync is logged and retried at the next tick. A zero `every` disables
/// resync: the task only waits for cancellation.
///
/// # Arguments
/// * `mirror` - Shared mirror to resynchronize
/// * `every` - Interval between resyncs
/// * `cancel` - Stops the task when cancelled
///
/// # Returns
/// A JoinHandle for the spawned task.
pub fn spawn_resync_task<F, B>(
    mirror: Arc<Mirror<F, B>>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    F: Formatter,
    B: Backend,
{
    tokio::spawn(async move {
        if every.is_zero() {
            warn!("Resync interval is zero, periodic resync disabled");
            cancel.cancelled().await;
            return;
        }

        info!(
            "Starting resync task with interval of {} seconds",
            every.as_secs()
        );

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the initial sync is the caller's.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Resync task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = mirror.sync().await {
                        warn!(error = %e, "Periodic resync failed");
                    }
                }
            }
        }
    })
}
