//! Directory Watcher using `notify`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    scanner::{DirectoryWatcher, FileChangeEvent},
};
use core_async::sync::mpsc;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::scanner::{is_hidden, is_supported_media};

/// Recursive filesystem watcher
///
/// Holds at most one OS watcher. Dropping it (on `stop` or on the next
/// `watch`) closes the event stream handed out earlier.
#[derive(Default)]
pub struct NotifyDirectoryWatcher {
    active: Mutex<Option<RecommendedWatcher>>,
}

impl NotifyDirectoryWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace(&self, watcher: Option<RecommendedWatcher>) {
        let mut guard = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = watcher;
    }
}

/// Maps one `notify` event to change events for media files.
///
/// Paths that still exist as non-media files are ignored. Removed paths can
/// no longer be inspected, so they pass through (a removed folder matters
/// as much as a removed file).
pub(crate) fn translate(event: &Event) -> Vec<FileChangeEvent> {
    event
        .paths
        .iter()
        .filter(|path| !is_hidden(path))
        .filter(|path| !path.is_file() || is_supported_media(path))
        .filter_map(|path| {
            let path = path.to_string_lossy().to_string();
            match event.kind {
                EventKind::Create(_) => Some(FileChangeEvent::Created(path)),
                EventKind::Modify(_) => Some(FileChangeEvent::Modified(path)),
                EventKind::Remove(_) => Some(FileChangeEvent::Removed(path)),
                _ => None,
            }
        })
        .collect()
}

#[async_trait]
impl DirectoryWatcher for NotifyDirectoryWatcher {
    async fn watch(&self, root: &Path) -> Result<mpsc::UnboundedReceiver<FileChangeEvent>> {
        if !root.is_dir() {
            return Err(BridgeError::OperationFailed(format!(
                "Cannot watch {}: not a directory",
                root.display()
            )));
        }

        // Stop the previous watcher first so two roots never report at once.
        self.replace(None);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in translate(&event) {
                        if tx.send(change).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Watcher reported an error"),
            },
            Config::default(),
        )
        .map_err(|e| BridgeError::OperationFailed(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to watch directory: {}", e)))?;

        self.replace(Some(watcher));
        info!(root = %root.display(), "Watching directory");
        Ok(rx)
    }

    async fn stop(&self) -> Result<()> {
        self.replace(None);
        debug!("Stopped directory watcher");
        Ok(())
    }
}
