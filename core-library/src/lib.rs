//! # Library Management Module
//!
//! Owns the per-file processing state of the media library and the directory
//! tree shown to the user.
//!
//! ## Overview
//!
//! This module manages:
//! - Domain models: files, folders, status records, transcripts, summaries
//! - [`FileStatusStore`]: durable status map with debounced persistence
//! - [`tree`]: building the directory tree from a scan and re-attaching status

pub mod error;
pub mod models;
pub mod status_store;
pub mod tree;

pub use error::{LibraryError, Result};
pub use models::{
    FileEntry, FileStatus, FolderEntry, ProviderInfo, StatusMap, StatusRecord, Summary,
    SummaryStatus, Transcript,
};
pub use status_store::FileStatusStore;
