//! # Event Bus System
//!
//! Typed event broadcasting between the Clip Flow core and its host using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: one enum per domain (directory session, status store,
//!   task queues, jobs), wrapped in [`CoreEvent`]
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Directory session├─────────>│           ├────────────>│  Host UI   │
//! └──────────────────┘          │ EventBus  │             └────────────┘
//! ┌──────────────────┐   emit   │ (broadcast│  subscribe  ┌────────────┐
//! │ Orchestrators    ├─────────>│  channel) ├────────────>│ Diagnostics│
//! └──────────────────┘          └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DirectoryEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Directory(DirectoryEvent::Closed {
//!         root: "/media/shows".to_string(),
//!     }))
//!     .ok();
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events. Non-fatal; progress events are the usual cause.
//! - **`RecvError::Closed`**: all senders were dropped (shutdown).
//!
//! Publishers ignore "no subscribers" errors; events are notifications, never
//! the source of truth. Current state is always readable from the stores.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Progress events arrive in bursts while several jobs run, so this is
/// sized for a few seconds of activity.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Directory session lifecycle
    Directory(DirectoryEvent),
    /// Per-file status changes
    Status(StatusEvent),
    /// Task queue bookkeeping
    Queue(QueueEvent),
    /// Transcription and summarization jobs
    Job(JobEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Directory(e) => e.description(),
            CoreEvent::Status(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Job(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Directory(DirectoryEvent::ScanFailed { .. }) => EventSeverity::Error,
            CoreEvent::Job(JobEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Directory(DirectoryEvent::Opened { .. }) => EventSeverity::Info,
            CoreEvent::Job(JobEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Status(StatusEvent::Reset { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Directory Events
// ============================================================================

/// Events describing the active directory selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DirectoryEvent {
    /// A directory was selected (or restored) and scanned.
    Opened {
        root: String,
        /// Media files found in the scan
        file_count: usize,
    },
    /// The active directory was rescanned.
    Refreshed { root: String, file_count: usize },
    /// The directory selection was cleared.
    Closed { root: String },
    /// Scanning or watching failed; the previous tree is kept.
    ScanFailed { root: String, message: String },
    /// The watcher reported a change below the root.
    FileChanged {
        path: String,
        /// `created`, `modified` or `removed`
        change: String,
    },
}

impl DirectoryEvent {
    fn description(&self) -> &str {
        match self {
            DirectoryEvent::Opened { .. } => "Directory opened",
            DirectoryEvent::Refreshed { .. } => "Directory refreshed",
            DirectoryEvent::Closed { .. } => "Directory closed",
            DirectoryEvent::ScanFailed { .. } => "Directory scan failed",
            DirectoryEvent::FileChanged { .. } => "File changed on disk",
        }
    }
}

// ============================================================================
// Status Events
// ============================================================================

/// Events emitted by the file status store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum StatusEvent {
    /// Transcription status or progress changed for one file.
    Updated {
        path: String,
        status: String,
        progress: u8,
    },
    /// Summary status changed for one file (`None` when cleared).
    SummaryUpdated {
        path: String,
        summary_status: Option<String>,
    },
    /// Records for vanished files were dropped.
    Pruned { removed: usize },
    /// Terminal records were reset to pending.
    Reset { count: usize },
    /// The whole status map was dropped.
    Cleared,
}

impl StatusEvent {
    fn description(&self) -> &str {
        match self {
            StatusEvent::Updated { .. } => "File status updated",
            StatusEvent::SummaryUpdated { .. } => "Summary status updated",
            StatusEvent::Pruned { .. } => "Stale status records pruned",
            StatusEvent::Reset { .. } => "Finished files reset to pending",
            StatusEvent::Cleared => "Status map cleared",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Events emitted by the task queues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// Counters after a queue mutation.
    StatsChanged {
        /// `transcription` or `summarization`
        queue: String,
        pending: usize,
        active: usize,
        completed: usize,
        error: usize,
        total: usize,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::StatsChanged { .. } => "Queue statistics changed",
        }
    }
}

// ============================================================================
// Job Events
// ============================================================================

/// Events describing individual transcription or summarization jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum JobEvent {
    Started {
        queue: String,
        path: String,
        provider: String,
    },
    Progress {
        queue: String,
        path: String,
        /// `extracting`, `transcribing` or `summarizing`
        stage: String,
        percent: u8,
    },
    Completed {
        queue: String,
        path: String,
        /// Wall-clock job duration in seconds
        duration_secs: f64,
    },
    Failed {
        queue: String,
        path: String,
        /// User-facing message, also stored on the file
        message: String,
    },
}

impl JobEvent {
    fn description(&self) -> &str {
        match self {
            JobEvent::Started { .. } => "Job started",
            JobEvent::Progress { .. } => "Job in progress",
            JobEvent::Completed { .. } => "Job completed",
            JobEvent::Failed { .. } => "Job failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let job_events = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Job(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_event(pending: usize) -> CoreEvent {
        CoreEvent::Queue(QueueEvent::StatsChanged {
            queue: "transcription".to_string(),
            pending,
            active: 0,
            completed: 0,
            error: 0,
            total: pending,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(stats_event(1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Directory(DirectoryEvent::Opened {
            root: "/media".to_string(),
            file_count: 6,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Job(_)));

        bus.emit(stats_event(3)).ok();
        let failed = CoreEvent::Job(JobEvent::Failed {
            queue: "transcription".to_string(),
            path: "/media/a.mp4".to_string(),
            message: "No audio stream found in this file.".to_string(),
        });
        bus.emit(failed.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), failed);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(stats_event(i)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let scan_failed = CoreEvent::Directory(DirectoryEvent::ScanFailed {
            root: "/gone".to_string(),
            message: "not found".to_string(),
        });
        assert_eq!(scan_failed.severity(), EventSeverity::Error);

        let progress = CoreEvent::Job(JobEvent::Progress {
            queue: "transcription".to_string(),
            path: "/a.mp3".to_string(),
            stage: "transcribing".to_string(),
            percent: 40,
        });
        assert_eq!(progress.severity(), EventSeverity::Debug);
        assert_eq!(progress.description(), "Job in progress");
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Status(StatusEvent::Updated {
            path: "/media/a.mp3".to_string(),
            status: "transcribing".to_string(),
            progress: 55,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Status");
        assert_eq!(json["payload"]["event"], "Updated");
        assert_eq!(json["payload"]["progress"], 55);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::default();
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(CoreEvent::Status(StatusEvent::Cleared)).ok();
        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, CoreEvent::Status(StatusEvent::Cleared));
    }
}
