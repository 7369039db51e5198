//! Long-running session tasks: the watcher listener and automatic dispatch.
//!
//! Both hold only a weak reference to the service and stop when it is
//! dropped or their token is cancelled.

use crate::service::{CoreService, ServiceInner};
use bridge_traits::FileChangeEvent;
use core_async::sync::broadcast::error::RecvError;
use core_async::sync::{broadcast, mpsc, CancellationToken};
use core_async::time::{timeout, Duration};
use core_runtime::events::{CoreEvent, DirectoryEvent, StatusEvent};
use core_runtime::logging::strip_path;
use futures::{pin_mut, select, FutureExt};
use std::future::Future;
use std::sync::Weak;
use tracing::{debug, warn};

/// Resolves `future` unless `token` is cancelled first.
async fn until_cancelled<F: Future>(token: &CancellationToken, future: F) -> Option<F::Output> {
    let cancelled = token.cancelled().fuse();
    let future = future.fuse();
    pin_mut!(cancelled, future);
    select! {
        _ = cancelled => None,
        output = future => Some(output),
    }
}

fn change_kind(change: &FileChangeEvent) -> &'static str {
    match change {
        FileChangeEvent::Created(_) => "created",
        FileChangeEvent::Modified(_) => "modified",
        FileChangeEvent::Removed(_) => "removed",
    }
}

/// Turns watcher notifications into rescans. Events arriving within
/// `settle_delay` of each other are folded into a single refresh.
pub(crate) async fn watch_loop(
    service: Weak<ServiceInner>,
    mut events: mpsc::UnboundedReceiver<FileChangeEvent>,
    settle_delay: Duration,
    token: CancellationToken,
) {
    loop {
        let Some(Some(first)) = until_cancelled(&token, events.recv()).await else {
            break;
        };
        let mut changes = vec![first];
        while let Ok(Some(change)) = timeout(settle_delay, events.recv()).await {
            changes.push(change);
        }
        if token.is_cancelled() {
            break;
        }
        let Some(inner) = service.upgrade() else {
            break;
        };
        let service = CoreService::from_inner(inner);

        for change in &changes {
            debug!(file = %strip_path(change.path()), change = change_kind(change), "File changed");
            let _ = service.event_bus().emit(CoreEvent::Directory(DirectoryEvent::FileChanged {
                path: change.path().to_string(),
                change: change_kind(change).to_string(),
            }));
        }
        if let Err(e) = service.refresh().await {
            warn!(error = %e, changes = changes.len(), "Rescan after file changes failed");
        }
    }
    debug!("Watch loop stopped");
}

/// Whether `event` can make new files eligible.
fn unlocks_work(event: &CoreEvent) -> bool {
    matches!(
        event,
        CoreEvent::Status(StatusEvent::Updated { status, .. }) if status == "completed"
    ) || matches!(event, CoreEvent::Status(StatusEvent::Reset { .. }))
}

/// Queues newly eligible files as transcripts land, so summaries follow
/// transcription without a manual trigger.
pub(crate) async fn auto_process_loop(
    service: Weak<ServiceInner>,
    mut events: broadcast::Receiver<CoreEvent>,
    token: CancellationToken,
) {
    loop {
        let dispatch = match until_cancelled(&token, events.recv()).await {
            None | Some(Err(RecvError::Closed)) => break,
            Some(Err(RecvError::Lagged(skipped))) => {
                debug!(skipped, "Auto-process listener lagged");
                true
            }
            Some(Ok(event)) => unlocks_work(&event),
        };
        if !dispatch {
            continue;
        }
        let Some(inner) = service.upgrade() else {
            break;
        };
        CoreService::from_inner(inner).auto_dispatch();
    }
    debug!("Auto-process loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[core_async::test]
    async fn test_until_cancelled_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();

        let output = until_cancelled(&token, core_async::time::sleep(Duration::from_secs(5))).await;
        assert!(output.is_none());
    }

    #[core_async::test]
    async fn test_until_cancelled_returns_output() {
        let token = CancellationToken::new();
        assert_eq!(until_cancelled(&token, async { 7 }).await, Some(7));
    }

    #[test]
    fn test_completed_transcripts_unlock_work() {
        let completed = CoreEvent::Status(StatusEvent::Updated {
            path: "/m/a.mp4".to_string(),
            status: "completed".to_string(),
            progress: 100,
        });
        let progress = CoreEvent::Status(StatusEvent::Updated {
            path: "/m/a.mp4".to_string(),
            status: "transcribing".to_string(),
            progress: 40,
        });

        assert!(unlocks_work(&completed));
        assert!(unlocks_work(&CoreEvent::Status(StatusEvent::Reset { count: 2 })));
        assert!(!unlocks_work(&progress));
    }
}
