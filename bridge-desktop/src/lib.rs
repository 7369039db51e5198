//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `SettingsStore` using a SQLite key-value table
//! - `SecureStore` using the `keyring` crate
//! - `DirectoryScanner` using `std::fs` on the blocking pool
//! - `DirectoryWatcher` using `notify`
//! - `TranscriptionEngine` for local whisper.cpp (audio extracted with ffmpeg)
//!   and for the OpenAI Whisper API
//! - `SummarizationEngine` for Ollama, OpenAI and Claude
//! - `WhisperModelStore` for listing, downloading and deleting local models
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsDirectoryScanner, SqliteSettingsStore};
//! use bridge_traits::DirectoryScanner;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scanner = FsDirectoryScanner::new();
//!     let tree = scanner.scan_tree("/Users/me/Videos".as_ref()).await.unwrap();
//!     let settings = SqliteSettingsStore::new("clipflow.db".into()).await.unwrap();
//! }
//! ```

mod local;
mod providers;
mod scanner;
mod settings;
mod watcher;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use local::{
    app_data_dir, AudioExtractor, DownloadProgress, LocalTools, LocalWhisperEngine, MediaInfo,
    ModelStatus, WhisperModel, WhisperModelStore, WHISPER_MODELS,
};
pub use providers::{
    ClaudeSummarizer, OllamaSummarizer, OpenAiSummarizer, OpenAiWhisperEngine,
    WHISPER_MAX_UPLOAD_BYTES,
};
pub use scanner::{is_supported_media, FsDirectoryScanner, AUDIO_EXTENSIONS, VIDEO_EXTENSIONS};
pub use settings::SqliteSettingsStore;
pub use watcher::NotifyDirectoryWatcher;

#[cfg(feature = "secure-store")]
pub use secure_store::{KeyringSecureStore, DEFAULT_SERVICE_NAME};
