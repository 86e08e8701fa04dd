//! Event Processing Task
//!
//! Runs the mirror's keyevent loop on its own tokio task.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backend::Backend;
use crate::format::Formatter;
use crate::Mirror;

/// Spawns `process_events` on a background task.
///
/// The task finishes once `cancel` is cancelled; awaiting the handle after
/// cancelling guarantees the subscription connection has been released.
///
/// # Example
/// ```ignore
/// let cancel = CancellationToken::new();
/// let events = spawn_event_task(mirror.clone(), cancel.clone());
/// // Later, during shutdown:
/// cancel.cancel();
/// events.await?;
/// ```
pub fn spawn_event_task<F, B>(mirror: Arc<Mirror<F, B>>, cancel: CancellationToken) -> JoinHandle<()>
where
    F: Formatter,
    B: Backend,
{
    tokio::spawn(async move {
        mirror.process_events(cancel).await;
        info!("Event task finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::MirrorOptions;
    use crate::format::IdentityFormatter;
    use std::time::Duration;

    #[tokio::test]
    async fn test_event_task_can_be_cancelled() {
        let backend = MemoryBackend::new();
        let mirror = Arc::new(Mirror::with_backend(
            backend,
            IdentityFormatter,
            MirrorOptions::default(),
        ));
        let cancel = CancellationToken::new();

        let handle = spawn_event_task(mirror, cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let finished = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(finished.is_ok(), "Task should finish after cancellation");
    }
}
