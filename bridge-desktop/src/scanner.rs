//! Filesystem Directory Scanner

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    scanner::{DirectoryScanner, RawNode},
};
use core_async::{task, time::unix_secs};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Video containers the transcription pipeline accepts
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm", "flv", "wmv"];

/// Audio formats the transcription pipeline accepts
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac", "aac", "ogg", "wma"];

/// Whether `path` has a supported media extension (case-insensitive).
pub fn is_supported_media(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS.contains(&ext.as_str()) || AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Entries found by one walk, grouped by parent folder.
#[derive(Default)]
struct Listing {
    folders: HashMap<PathBuf, Vec<PathBuf>>,
    files: HashMap<PathBuf, Vec<RawNode>>,
}

/// Recursive scanner over the local filesystem
///
/// Scan rules:
/// - hidden entries (leading `.`) are skipped
/// - only supported media files are kept
/// - folders without media anywhere below them are dropped
/// - children sort folders first, then by case-insensitive name
/// - symlinks are followed, but a link back to one of its own ancestors is
///   skipped
/// - unreadable subfolders are skipped; only an unreadable root is an error
#[derive(Debug, Clone, Default)]
pub struct FsDirectoryScanner;

impl FsDirectoryScanner {
    pub fn new() -> Self {
        Self
    }

    fn scan_blocking(root: &Path) -> Result<RawNode> {
        let metadata = std::fs::metadata(root).map_err(|e| {
            BridgeError::OperationFailed(format!("Cannot read directory {}: {}", root.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(BridgeError::OperationFailed(format!(
                "Not a directory: {}",
                root.display()
            )));
        }
        // The root itself must be listable; deeper failures are tolerated.
        std::fs::read_dir(root)?;

        let mut listing = Listing::default();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    match (e.path(), e.loop_ancestor()) {
                        (Some(path), Some(ancestor)) => warn!(
                            path = %path.display(),
                            ancestor = %ancestor.display(),
                            "Skipping symlink loop"
                        ),
                        _ => warn!(error = %e, "Skipping unreadable entry"),
                    }
                    continue;
                }
            };

            let path = entry.path();
            let Some(parent) = path.parent() else {
                continue;
            };
            if entry.file_type().is_dir() {
                listing
                    .folders
                    .entry(parent.to_path_buf())
                    .or_default()
                    .push(path.to_path_buf());
            } else if is_supported_media(path) {
                let Ok(file_meta) = entry.metadata() else {
                    continue;
                };
                let modified = file_meta.modified().map(unix_secs).unwrap_or(0);
                listing
                    .files
                    .entry(parent.to_path_buf())
                    .or_default()
                    .push(RawNode::file(
                        path.to_string_lossy(),
                        Self::display_name(path),
                        file_meta.len(),
                        modified,
                    ));
            }
        }

        Ok(Self::assemble(root, &mut listing))
    }

    fn assemble(path: &Path, listing: &mut Listing) -> RawNode {
        let mut children: Vec<RawNode> = listing
            .folders
            .remove(path)
            .unwrap_or_default()
            .iter()
            .map(|folder| Self::assemble(folder, listing))
            .filter(|node| !node.children.is_empty())
            .collect();
        children.extend(listing.files.remove(path).unwrap_or_default());

        children.sort_by(Self::display_order);
        Self::folder_node(path, children)
    }

    fn folder_node(path: &Path, children: Vec<RawNode>) -> RawNode {
        RawNode::folder(path.to_string_lossy(), Self::display_name(path), children)
    }

    fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string())
    }

    fn display_order(a: &RawNode, b: &RawNode) -> Ordering {
        match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        }
    }
}

#[async_trait]
impl DirectoryScanner for FsDirectoryScanner {
    async fn scan_tree(&self, root: &Path) -> Result<RawNode> {
        let root = root.to_path_buf();
        let node = task::spawn_blocking(move || Self::scan_blocking(&root))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Scan task failed: {}", e)))??;

        debug!(root = %node.path, children = node.children.len(), "Scanned directory");
        Ok(node)
    }
}
