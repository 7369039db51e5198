//! # Directory Tree Sync
//!
//! Pure functions that turn a raw scanner snapshot into the UI tree and keep
//! it consistent with the status map.
//!
//! ## Overview
//!
//! The tree is ephemeral: it is rebuilt wholesale on every scan, and status
//! is re-attached by path from the long-lived [`StatusMap`]. Operations return
//! new trees instead of mutating shared state, so a failed scan can never
//! leave a half-updated tree behind.
//!
//! Traversal order is depth-first pre-order: a folder's own files first, then
//! its subfolders in scan order.

use crate::models::{FileEntry, FolderEntry, StatusMap};

use bridge_traits::RawNode;
use std::collections::HashSet;

/// Converts a raw scanner node into a tree, attaching each file's status
/// record (or pending/0 when none exists). Folders start expanded.
pub fn build_tree(raw: &RawNode, statuses: &StatusMap) -> FolderEntry {
    let mut folder = FolderEntry::new(raw.path.clone(), raw.name.clone());
    for child in &raw.children {
        if child.is_dir {
            folder.folders.push(build_tree(child, statuses));
        } else {
            folder
                .files
                .push(FileEntry::from_raw(child, statuses.get(&child.path)));
        }
    }
    folder
}

/// Like [`build_tree`], but folders that were collapsed in `previous` stay
/// collapsed.
pub fn rebuild_tree(
    raw: &RawNode,
    statuses: &StatusMap,
    previous: Option<&FolderEntry>,
) -> FolderEntry {
    let mut tree = build_tree(raw, statuses);
    if let Some(previous) = previous {
        let mut collapsed = HashSet::new();
        collect_collapsed(previous, &mut collapsed);
        if !collapsed.is_empty() {
            restore_collapsed(&mut tree, &collapsed);
        }
    }
    tree
}

fn collect_collapsed(folder: &FolderEntry, out: &mut HashSet<String>) {
    if !folder.expanded {
        out.insert(folder.path.clone());
    }
    for child in &folder.folders {
        collect_collapsed(child, out);
    }
}

fn restore_collapsed(folder: &mut FolderEntry, collapsed: &HashSet<String>) {
    if collapsed.contains(&folder.path) {
        folder.expanded = false;
    }
    for child in &mut folder.folders {
        restore_collapsed(child, collapsed);
    }
}

/// Returns a new tree with the expanded flag of `folder_path` inverted.
///
/// Every other folder keeps its flag. An unknown path yields an unchanged copy.
pub fn toggle_folder(tree: &FolderEntry, folder_path: &str) -> FolderEntry {
    let mut next = tree.clone();
    if let Some(folder) = find_folder_mut(&mut next, folder_path) {
        folder.expanded = !folder.expanded;
    }
    next
}

pub fn find_folder<'a>(tree: &'a FolderEntry, folder_path: &str) -> Option<&'a FolderEntry> {
    if tree.path == folder_path {
        return Some(tree);
    }
    tree.folders
        .iter()
        .find_map(|child| find_folder(child, folder_path))
}

fn find_folder_mut<'a>(tree: &'a mut FolderEntry, folder_path: &str) -> Option<&'a mut FolderEntry> {
    if tree.path == folder_path {
        return Some(tree);
    }
    tree.folders
        .iter_mut()
        .find_map(|child| find_folder_mut(child, folder_path))
}

pub fn find_file<'a>(tree: &'a FolderEntry, path: &str) -> Option<&'a FileEntry> {
    tree.files
        .iter()
        .find(|file| file.path == path)
        .or_else(|| tree.folders.iter().find_map(|child| find_file(child, path)))
}

/// Every file in the tree, pre-order.
pub fn list_all_files(tree: &FolderEntry) -> Vec<&FileEntry> {
    let mut files = Vec::new();
    walk_files(tree, false, &mut files);
    files
}

/// Files whose folder and every ancestor folder are expanded, pre-order.
pub fn visible_files(tree: &FolderEntry) -> Vec<&FileEntry> {
    let mut files = Vec::new();
    walk_files(tree, true, &mut files);
    files
}

fn walk_files<'a>(folder: &'a FolderEntry, visible_only: bool, out: &mut Vec<&'a FileEntry>) {
    if visible_only && !folder.expanded {
        return;
    }
    out.extend(folder.files.iter());
    for child in &folder.folders {
        walk_files(child, visible_only, out);
    }
}

/// Number of files below `tree`, collapsed folders included.
pub fn count_files(tree: &FolderEntry) -> usize {
    tree.files.len() + tree.folders.iter().map(count_files).sum::<usize>()
}

/// Paths of every file in the tree; the valid set for pruning.
pub fn collect_file_paths(tree: &FolderEntry) -> HashSet<String> {
    list_all_files(tree)
        .into_iter()
        .map(|file| file.path.clone())
        .collect()
}

/// Projects the live status of `file.path` onto a scanned file.
///
/// A file without a record comes back unchanged.
pub fn merge_status(file: &FileEntry, statuses: &StatusMap) -> FileEntry {
    let mut merged = file.clone();
    if let Some(record) = statuses.get(&file.path) {
        merged.apply_record(record);
    }
    merged
}

/// Re-projects the status map onto every file, keeping structure and
/// expanded flags.
///
/// The map is authoritative here: files without a record show pending/0,
/// as they would in a tree built by [`build_tree`].
pub fn apply_status(tree: &FolderEntry, statuses: &StatusMap) -> FolderEntry {
    FolderEntry {
        path: tree.path.clone(),
        name: tree.name.clone(),
        files: tree
            .files
            .iter()
            .map(|file| {
                let mut projected = merge_status(file, statuses);
                if !statuses.contains_key(&file.path) {
                    projected.clear_record();
                }
                projected
            })
            .collect(),
        folders: tree
            .folders
            .iter()
            .map(|child| apply_status(child, statuses))
            .collect(),
        expanded: tree.expanded,
    }
}
