//! Directory Scanning and Watching
//!
//! The scanner produces a raw snapshot of a media directory; the watcher
//! reports changes underneath a root so the core can rescan. Neither keeps
//! any per-file processing state.

use async_trait::async_trait;
use core_async::sync::mpsc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// One node of a raw directory snapshot.
///
/// Folders carry their children in display order; files carry size,
/// modification time (unix seconds) and lowercase extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: i64,
    pub extension: Option<String>,
    pub children: Vec<RawNode>,
}

impl RawNode {
    /// Creates a folder node.
    pub fn folder(path: impl Into<String>, name: impl Into<String>, children: Vec<RawNode>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            is_dir: true,
            size: 0,
            modified: 0,
            extension: None,
            children,
        }
    }

    /// Creates a file node. The extension is derived from the name.
    pub fn file(path: impl Into<String>, name: impl Into<String>, size: u64, modified: i64) -> Self {
        let name = name.into();
        let extension = Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());
        Self {
            path: path.into(),
            name,
            is_dir: false,
            size,
            modified,
            extension,
            children: Vec::new(),
        }
    }
}

/// Change notification emitted by a [`DirectoryWatcher`].
///
/// Delivery is best effort: events may be coalesced or dropped, so consumers
/// treat them as a hint to rescan rather than as an exact diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "path")]
pub enum FileChangeEvent {
    Created(String),
    Modified(String),
    Removed(String),
}

impl FileChangeEvent {
    pub fn path(&self) -> &str {
        match self {
            FileChangeEvent::Created(path)
            | FileChangeEvent::Modified(path)
            | FileChangeEvent::Removed(path) => path,
        }
    }
}

/// Produces a raw snapshot of a directory tree.
#[async_trait]
pub trait DirectoryScanner: Send + Sync {
    /// Scans `root` recursively.
    ///
    /// # Errors
    ///
    /// Fails if `root` is missing, not a directory, or unreadable. A failure
    /// must not yield a partial tree.
    async fn scan_tree(&self, root: &Path) -> Result<RawNode>;
}

/// Watches a directory tree for changes.
///
/// At most one root is watched at a time; calling [`watch`](Self::watch)
/// again replaces the previous subscription.
#[async_trait]
pub trait DirectoryWatcher: Send + Sync {
    /// Starts watching `root` recursively and returns the event stream.
    async fn watch(&self, root: &Path) -> Result<mpsc::UnboundedReceiver<FileChangeEvent>>;

    /// Stops the active watch, closing its event stream.
    async fn stop(&self) -> Result<()>;
}
