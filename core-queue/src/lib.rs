//! # Task Queue
//!
//! Bounded-concurrency FIFO scheduler for asynchronous jobs keyed by id.
//!
//! ## Overview
//!
//! A [`TaskQueue`] throttles how many jobs of one class run at the same time.
//! Each job is tracked through four disjoint sets (pending, active, completed,
//! error) so callers can ask whether a file is already queued, running, done
//! or failed without keeping their own bookkeeping.
//!
//! - **Deduplication**: enqueueing an id that is pending, active or completed is a no-op
//! - **FIFO start order**: the oldest pending job starts first
//! - **Fault isolation**: an error or panic moves the job to the error set and draining continues
//! - **Stats**: a listener observes counts after every transition
//!
//! ## Usage
//!
//! ```ignore
//! use core_queue::{task, TaskQueue};
//!
//! let queue = TaskQueue::new("transcription", 2)?;
//! queue.set_stats_listener(|stats| println!("{} running", stats.active));
//!
//! queue.enqueue("/videos/talk.mp4", task(|| async {
//!     transcribe("/videos/talk.mp4").await?;
//!     Ok(())
//! }))?;
//!
//! queue.wait_idle().await;
//! ```

pub mod error;
pub mod queue;

pub use error::{QueueError, Result};
pub use queue::{task, QueueStats, StatsListener, Task, TaskFuture, TaskQueue, TaskState};
