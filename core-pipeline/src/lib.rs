//! # Processing Pipeline
//!
//! Turns pending media files into transcripts and transcripts into summaries.
//!
//! ## Overview
//!
//! Two orchestrators, each owning its own [`TaskQueue`](core_queue::TaskQueue):
//! - [`TranscriptionOrchestrator`]: local model first or cloud first, with
//!   fallback to the other when the preferred one is unusable
//! - [`SummarizationOrchestrator`]: the single configured summary provider
//!
//! Providers are selected when a job starts. Every failure is stored on the
//! file as a readable message (see [`JobFailure`]) and the job moves to the
//! queue's error set; other jobs keep running.
//!
//! ## Usage
//!
//! ```ignore
//! let transcription = TranscriptionOrchestrator::new(&config, store.clone(), bus.clone())?;
//! let queued = transcription.dispatch(&tree)?;
//! transcription.queue().wait_idle().await;
//! ```

pub mod error;
pub mod failure;
mod jobs;
pub mod selection;
pub mod summarization;
pub mod transcription;

pub use error::{PipelineError, Result};
pub use failure::JobFailure;
pub use selection::{SummaryChoice, TranscriptionChoice};
pub use summarization::{SummarizationOrchestrator, SUMMARIZATION_QUEUE};
pub use transcription::{TranscriptionOrchestrator, TRANSCRIPTION_QUEUE};
