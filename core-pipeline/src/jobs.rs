use crate::failure::JobFailure;
use bridge_traits::error::Result as BridgeResult;
use core_async::time::timeout;
use core_queue::TaskQueue;
use core_runtime::events::{CoreEvent, EventBus, JobEvent, QueueEvent};
use std::future::Future;
use std::time::Duration;

/// Runs a provider call, turning an elapsed deadline or a bridge error into
/// a [`JobFailure`].
pub(crate) async fn run_with_deadline<T, F>(limit: Option<Duration>, call: F) -> Result<T, JobFailure>
where
    F: Future<Output = BridgeResult<T>>,
{
    let result = match limit {
        Some(limit) => timeout(limit, call)
            .await
            .map_err(|_| JobFailure::Timeout(limit))?,
        None => call.await,
    };
    result.map_err(JobFailure::from)
}

/// Publishes every stats change of `queue` on the event bus.
pub(crate) fn forward_queue_stats(queue: &TaskQueue, event_bus: &EventBus) {
    let bus = event_bus.clone();
    let name = queue.name().to_string();
    queue.set_stats_listener(move |stats| {
        let _ = bus.emit(CoreEvent::Queue(QueueEvent::StatsChanged {
            queue: name.clone(),
            pending: stats.pending,
            active: stats.active,
            completed: stats.completed,
            error: stats.error,
            total: stats.total,
        }));
    });
}

pub(crate) fn emit_job(event_bus: &EventBus, event: JobEvent) {
    // No subscribers is fine.
    let _ = event_bus.emit(CoreEvent::Job(event));
}
