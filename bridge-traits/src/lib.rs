//! # Host Bridge Traits
//!
//! Capability contracts between the Clip Flow core and the host platform.
//!
//! ## Overview
//!
//! The core schedules and tracks transcription work but never touches the
//! filesystem, the network, or the OS credential vault directly. Each of
//! those capabilities is a trait here, implemented per host (the desktop
//! implementations live in `bridge-desktop`).
//!
//! ## Traits
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Durable key-value settings
//! - [`SecureStore`](storage::SecureStore) - Provider API keys
//!
//! ### Media Library
//! - [`DirectoryScanner`](scanner::DirectoryScanner) - Raw snapshot of a media directory
//! - [`DirectoryWatcher`](scanner::DirectoryWatcher) - Change notifications under a root
//!
//! ### Processing
//! - [`TranscriptionEngine`](transcription::TranscriptionEngine) - Audio/video to timed text
//! - [`SummarizationEngine`](summarization::SummarizationEngine) - Transcript to summary
//!
//! ### Utilities
//! - [`LoggerSink`](logger::LoggerSink) - Forward structured logs to the host
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability
//! is missing:
//!
//! ```ignore
//! let scanner = config.scanner
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "DirectoryScanner".to_string(),
//!         message: "No directory scanner provided. \
//!                  Desktop: enable the desktop-shims feature.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits return [`BridgeError`](error::BridgeError). Provider
//! failures use the dedicated variants (`MissingCredential`, `Network`,
//! `RateLimited`, `NoAudioStream`, `ModelNotFound`, `InputTooLarge`) so the
//! pipeline can turn them into readable per-file messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; implementations are shared
//! across concurrently running jobs.

pub mod error;
pub mod logger;
pub mod scanner;
pub mod storage;
pub mod summarization;
pub mod transcription;

pub use error::BridgeError;

pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use scanner::{DirectoryScanner, DirectoryWatcher, FileChangeEvent, RawNode};
pub use storage::{SecureStore, SettingsStore};
pub use summarization::{SummarizationEngine, SummaryProviderKind, SummaryRequest};
pub use transcription::{
    ProgressCallback, TranscriptSegment, TranscriptionEngine, TranscriptionOutput,
    TranscriptionProgress, TranscriptionProviderKind, TranscriptionRequest, TranscriptionStage,
};
