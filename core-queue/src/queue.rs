//! Bounded-concurrency FIFO scheduler.
//!
//! Bookkeeping lives behind a `std::sync::Mutex` that is never held across an
//! `.await`; job bodies run as spawned tasks on the ambient runtime.

use crate::error::{QueueError, Result};

use core_async::runtime::{self, Handle};
use core_async::sync::watch;
use core_async::task::panic_message;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Future produced by a queued job.
pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Zero-argument unit of work; invoked once when the job starts.
pub type Task = Box<dyn FnOnce() -> TaskFuture + Send>;

/// Observer of queue counts, invoked after every state transition.
pub type StatsListener = Arc<dyn Fn(QueueStats) + Send + Sync>;

/// Wraps an async closure into a [`Task`].
pub fn task<F, Fut>(f: F) -> Task
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

/// Lifecycle of a job id inside one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Active,
    Completed,
    Error,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of queue counts. `total` is the sum of the four sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub error: usize,
    pub total: usize,
}

impl QueueStats {
    /// True when nothing is waiting or running.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.active == 0
    }
}

struct PendingTask {
    id: String,
    task: Task,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingTask>,
    active: HashSet<String>,
    completed: HashSet<String>,
    errors: HashMap<String, String>,
    /// Spawned jobs that have not returned yet, including ones abandoned by `clear`
    running: usize,
    /// Bumped by `clear` so late results of abandoned jobs are discarded
    generation: u64,
}

impl QueueState {
    fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|entry| entry.id == id)
    }

    fn state_of(&self, id: &str) -> Option<TaskState> {
        if self.active.contains(id) {
            Some(TaskState::Active)
        } else if self.is_pending(id) {
            Some(TaskState::Pending)
        } else if self.completed.contains(id) {
            Some(TaskState::Completed)
        } else if self.errors.contains_key(id) {
            Some(TaskState::Error)
        } else {
            None
        }
    }

    fn stats(&self) -> QueueStats {
        let pending = self.pending.len();
        let active = self.active.len();
        let completed = self.completed.len();
        let error = self.errors.len();
        QueueStats {
            pending,
            active,
            completed,
            error,
            total: pending + active + completed + error,
        }
    }

    fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.running == 0
    }
}

struct Inner {
    name: String,
    ceiling: usize,
    state: Mutex<QueueState>,
    listener: Mutex<Option<StatsListener>>,
    idle: watch::Sender<bool>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes the current counts to the listener and the idle watch.
    fn notify(&self) {
        let (stats, drained) = {
            let state = self.lock();
            (state.stats(), state.is_drained())
        };

        self.idle.send_if_modified(|idle| {
            let changed = *idle != drained;
            *idle = drained;
            changed
        });

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(stats);
        }
    }

    /// Starts pending jobs until the ceiling is reached.
    fn pump(self: &Arc<Self>, handle: &Handle) {
        loop {
            let (id, task, generation) = {
                let mut state = self.lock();
                if state.running >= self.ceiling {
                    break;
                }
                let Some(next) = state.pending.pop_front() else {
                    break;
                };
                state.running += 1;
                state.active.insert(next.id.clone());
                (next.id, next.task, state.generation)
            };

            debug!(queue = %self.name, task_id = %id, "Task started");
            self.notify();

            let inner = Arc::clone(self);
            let runtime = handle.clone();
            handle.spawn(async move {
                let outcome = AssertUnwindSafe(async move { task().await })
                    .catch_unwind()
                    .await;
                let result = match outcome {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(format!("{:#}", err)),
                    Err(payload) => Err(panic_message(payload.as_ref())),
                };
                inner.finish(id, generation, result);
                inner.pump(&runtime);
            });
        }
    }

    fn finish(&self, id: String, generation: u64, result: std::result::Result<(), String>) {
        {
            let mut state = self.lock();
            state.running = state.running.saturating_sub(1);

            if state.generation != generation {
                debug!(queue = %self.name, task_id = %id, "Discarding result of cleared task");
            } else {
                state.active.remove(&id);
                match result {
                    Ok(()) => {
                        debug!(queue = %self.name, task_id = %id, "Task completed");
                        state.completed.insert(id);
                    }
                    Err(message) => {
                        warn!(queue = %self.name, task_id = %id, error = %message, "Task failed");
                        state.errors.insert(id, message);
                    }
                }
            }
        }
        self.notify();
    }
}

/// Bounded-concurrency FIFO job queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    /// Creates a queue running at most `ceiling` jobs at a time.
    pub fn new(name: impl Into<String>, ceiling: usize) -> Result<Self> {
        let name = name.into();
        if ceiling == 0 {
            return Err(QueueError::InvalidCeiling { queue: name });
        }

        let (idle, _) = watch::channel(true);
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                ceiling,
                state: Mutex::new(QueueState::default()),
                listener: Mutex::new(None),
                idle,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ceiling(&self) -> usize {
        self.inner.ceiling
    }

    /// Installs the stats listener, replacing any previous one.
    pub fn set_stats_listener<F>(&self, listener: F)
    where
        F: Fn(QueueStats) + Send + Sync + 'static,
    {
        *self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    pub fn clear_stats_listener(&self) {
        *self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Adds a job and starts it if a slot is free.
    ///
    /// Returns `Ok(false)` without touching the queue when `id` is already
    /// pending, active or completed. An id in the error set is moved back to
    /// pending, which is how a failed job is retried.
    ///
    /// # Errors
    ///
    /// `QueueError::NoRuntime` when called outside an async runtime.
    pub fn enqueue(&self, id: impl Into<String>, task: Task) -> Result<bool> {
        let id = id.into();
        let handle = runtime::current().ok_or_else(|| QueueError::NoRuntime {
            queue: self.inner.name.clone(),
        })?;

        {
            let mut state = self.inner.lock();
            if state.is_pending(&id) || state.active.contains(&id) || state.completed.contains(&id)
            {
                debug!(queue = %self.inner.name, task_id = %id, "Task already tracked, skipping");
                return Ok(false);
            }
            if state.errors.remove(&id).is_some() {
                info!(queue = %self.inner.name, task_id = %id, "Retrying failed task");
            }
            state.pending.push_back(PendingTask { id, task });
        }

        self.inner.notify();
        self.inner.pump(&handle);
        Ok(true)
    }

    /// Removes a job that has not started yet. Running jobs are unaffected.
    pub fn dequeue(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.lock();
            let before = state.pending.len();
            state.pending.retain(|entry| entry.id != id);
            state.pending.len() != before
        };
        if removed {
            self.inner.notify();
        }
        removed
    }

    /// Pending or active.
    pub fn has(&self, id: &str) -> bool {
        let state = self.inner.lock();
        state.active.contains(id) || state.is_pending(id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.inner.lock().active.contains(id)
    }

    pub fn state(&self, id: &str) -> Option<TaskState> {
        self.inner.lock().state_of(id)
    }

    /// Message captured when the job failed or panicked.
    pub fn error_message(&self, id: &str) -> Option<String> {
        self.inner.lock().errors.get(id).cloned()
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats()
    }

    /// Forgets completed and failed jobs.
    pub fn clear_completed(&self) {
        {
            let mut state = self.inner.lock();
            state.completed.clear();
            state.errors.clear();
        }
        self.inner.notify();
    }

    /// Forgets one completed or failed job so it can be enqueued again.
    pub fn reset_item(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.lock();
            state.completed.remove(id) || state.errors.remove(id).is_some()
        };
        if removed {
            self.inner.notify();
        }
        removed
    }

    /// Empties every set.
    ///
    /// Jobs already running are not interrupted; they keep their slot until
    /// they return and their results are dropped.
    pub fn clear(&self) {
        {
            let mut state = self.inner.lock();
            state.pending.clear();
            state.active.clear();
            state.completed.clear();
            state.errors.clear();
            state.generation += 1;
        }
        info!(queue = %self.inner.name, "Queue cleared");
        self.inner.notify();
    }

    /// Resolves once no job is pending or running.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = idle.wait_for(|drained| *drained).await;
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.inner.name)
            .field("ceiling", &self.inner.ceiling)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::time::{sleep, Duration};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok_task() -> Task {
        task(|| async { Ok(()) })
    }

    /// Job that blocks until the gate opens.
    fn gated(gate: watch::Receiver<bool>) -> Task {
        task(move || async move {
            let mut gate = gate;
            gate.wait_for(|open| *open).await?;
            Ok(())
        })
    }

    async fn settle() {
        sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn test_new_rejects_zero_ceiling() {
        assert_eq!(
            TaskQueue::new("transcription", 0).unwrap_err(),
            QueueError::InvalidCeiling {
                queue: "transcription".to_string()
            }
        );
    }

    #[test]
    fn test_enqueue_outside_runtime_fails() {
        let queue = TaskQueue::new("transcription", 1).unwrap();
        assert!(matches!(
            queue.enqueue("a.mp4", ok_task()),
            Err(QueueError::NoRuntime { .. })
        ));
        assert_eq!(queue.stats(), QueueStats::default());
    }

    #[core_async::test]
    async fn test_enqueue_runs_to_completion() {
        let queue = TaskQueue::new("transcription", 2).unwrap();
        assert!(queue.enqueue("a.mp4", ok_task()).unwrap());

        queue.wait_idle().await;

        assert_eq!(queue.state("a.mp4"), Some(TaskState::Completed));
        assert_eq!(
            queue.stats(),
            QueueStats {
                pending: 0,
                active: 0,
                completed: 1,
                error: 0,
                total: 1
            }
        );
    }

    #[core_async::test]
    async fn test_duplicate_enqueue_is_noop() {
        let queue = TaskQueue::new("transcription", 1).unwrap();
        let (open, gate) = watch::channel(false);
        let runs = Arc::new(AtomicUsize::new(0));

        let counting = |runs: Arc<AtomicUsize>| {
            task(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        assert!(queue.enqueue("busy.mp4", gated(gate)).unwrap());
        assert!(queue.enqueue("a.mp4", counting(runs.clone())).unwrap());
        // pending and active duplicates
        assert!(!queue.enqueue("a.mp4", counting(runs.clone())).unwrap());
        assert!(!queue.enqueue("busy.mp4", ok_task()).unwrap());
        assert_eq!(queue.stats().total, 2);

        open.send(true).unwrap();
        queue.wait_idle().await;

        // completed duplicate
        assert!(!queue.enqueue("a.mp4", counting(runs.clone())).unwrap());
        queue.wait_idle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[core_async::test]
    async fn test_ceiling_is_never_exceeded() {
        let queue = TaskQueue::new("summarization", 3).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..10 {
            let running = running.clone();
            let peak = peak.clone();
            queue
                .enqueue(
                    format!("{i}.mp3"),
                    task(move || async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }),
                )
                .unwrap();
            assert!(queue.stats().active <= 3);
        }

        queue.wait_idle().await;
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(queue.stats().completed, 10);
    }

    #[core_async::test]
    async fn test_start_order_is_fifo() {
        let queue = TaskQueue::new("transcription", 1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["c.mp4", "a.mp4", "b.mp4"] {
            let order = order.clone();
            queue
                .enqueue(
                    name,
                    task(move || async move {
                        order.lock().unwrap().push(name);
                        Ok(())
                    }),
                )
                .unwrap();
        }

        queue.wait_idle().await;
        assert_eq!(*order.lock().unwrap(), vec!["c.mp4", "a.mp4", "b.mp4"]);
    }

    #[core_async::test]
    async fn test_failures_do_not_stop_draining() {
        let queue = TaskQueue::new("transcription", 1).unwrap();

        queue
            .enqueue("broken.mp4", task(|| async { anyhow::bail!("no audio stream") }))
            .unwrap();
        queue
            .enqueue(
                "panics.mp4",
                task(|| async {
                    panic!("decoder crashed");
                }),
            )
            .unwrap();
        queue.enqueue("fine.mp4", ok_task()).unwrap();

        queue.wait_idle().await;

        assert_eq!(queue.state("broken.mp4"), Some(TaskState::Error));
        assert_eq!(
            queue.error_message("broken.mp4").as_deref(),
            Some("no audio stream")
        );
        assert_eq!(
            queue.error_message("panics.mp4").as_deref(),
            Some("decoder crashed")
        );
        assert_eq!(queue.state("fine.mp4"), Some(TaskState::Completed));
        assert_eq!(queue.stats().error, 2);
    }

    #[core_async::test]
    async fn test_failed_task_can_be_retried() {
        let queue = TaskQueue::new("transcription", 1).unwrap();
        queue
            .enqueue("flaky.mp4", task(|| async { anyhow::bail!("rate limited") }))
            .unwrap();
        queue.wait_idle().await;
        assert!(!queue.has("flaky.mp4"));

        assert!(queue.enqueue("flaky.mp4", ok_task()).unwrap());
        queue.wait_idle().await;

        assert_eq!(queue.state("flaky.mp4"), Some(TaskState::Completed));
        assert_eq!(queue.error_message("flaky.mp4"), None);
    }

    #[core_async::test]
    async fn test_dequeue_only_removes_pending() {
        let queue = TaskQueue::new("transcription", 1).unwrap();
        let (open, gate) = watch::channel(false);

        queue.enqueue("running.mp4", gated(gate)).unwrap();
        queue.enqueue("waiting.mp4", ok_task()).unwrap();

        assert!(queue.is_active("running.mp4"));
        assert!(!queue.dequeue("running.mp4"));
        assert!(queue.dequeue("waiting.mp4"));
        assert!(!queue.has("waiting.mp4"));
        assert!(queue.has("running.mp4"));

        open.send(true).unwrap();
        queue.wait_idle().await;
        assert_eq!(queue.state("waiting.mp4"), None);
    }

    #[core_async::test]
    async fn test_clear_completed_keeps_pending_and_active() {
        let queue = TaskQueue::new("transcription", 1).unwrap();
        queue.enqueue("done.mp4", ok_task()).unwrap();
        queue
            .enqueue("failed.mp4", task(|| async { anyhow::bail!("boom") }))
            .unwrap();
        queue.wait_idle().await;

        let (open, gate) = watch::channel(false);
        queue.enqueue("running.mp4", gated(gate)).unwrap();
        queue.enqueue("waiting.mp4", ok_task()).unwrap();

        queue.clear_completed();

        let stats = queue.stats();
        assert_eq!((stats.pending, stats.active), (1, 1));
        assert_eq!((stats.completed, stats.error), (0, 0));

        open.send(true).unwrap();
        queue.wait_idle().await;
    }

    #[core_async::test]
    async fn test_reset_item_allows_rerun() {
        let queue = TaskQueue::new("summarization", 1).unwrap();
        queue.enqueue("a.mp3", ok_task()).unwrap();
        queue.wait_idle().await;

        assert!(queue.reset_item("a.mp3"));
        assert!(!queue.reset_item("a.mp3"));
        assert_eq!(queue.state("a.mp3"), None);
        assert!(queue.enqueue("a.mp3", ok_task()).unwrap());
        queue.wait_idle().await;
    }

    #[core_async::test]
    async fn test_clear_discards_in_flight_results() {
        let queue = TaskQueue::new("transcription", 1).unwrap();
        let (open, gate) = watch::channel(false);

        queue.enqueue("old.mp4", gated(gate)).unwrap();
        queue.enqueue("queued.mp4", ok_task()).unwrap();
        queue.clear();
        assert_eq!(queue.stats(), QueueStats::default());

        // The abandoned job still holds the only slot
        queue.enqueue("new.mp4", ok_task()).unwrap();
        settle().await;
        assert_eq!(queue.state("new.mp4"), Some(TaskState::Pending));

        open.send(true).unwrap();
        queue.wait_idle().await;

        assert_eq!(queue.state("old.mp4"), None);
        assert_eq!(queue.state("new.mp4"), Some(TaskState::Completed));
    }

    #[core_async::test]
    async fn test_stats_listener_sees_every_transition() {
        let queue = TaskQueue::new("transcription", 1).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        queue.set_stats_listener(move |stats| sink.lock().unwrap().push(stats));

        queue.enqueue("a.mp4", ok_task()).unwrap();
        {
            // Notified synchronously, before the job had a chance to run
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!((seen[0].pending, seen[0].active), (1, 0));
            assert_eq!((seen[1].pending, seen[1].active), (0, 1));
        }

        queue.wait_idle().await;
        let last = *seen.lock().unwrap().last().unwrap();
        assert_eq!(last.completed, 1);
        assert_eq!(last.total, 1);

        queue.clear_stats_listener();
        queue.clear_completed();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_stats_serialize_with_total() {
        let stats = QueueStats {
            pending: 1,
            active: 2,
            completed: 3,
            error: 0,
            total: 6,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["total"], 6);
        assert!(!stats.is_idle());
        assert_eq!(TaskState::Completed.to_string(), "completed");
        assert!(TaskState::Error.is_terminal());
    }
}
