//! # Directory Session
//!
//! [`CoreService`] owns one directory selection at a time: the scanned tree,
//! the status store behind it, both job queues and the watcher listener.
//!
//! ## Lifecycle
//!
//! ```text
//! restore / open_directory ──► scan ──► prune stale records ──► watch
//!        │                                                    │
//!        ▼                                                    ▼
//!   process_pending ◄── refresh (no prune) ◄── settled file changes
//!        │
//!        ▼
//! close_directory ──► stop watch, clear queues and status, forget root
//! ```
//!
//! The stored tree carries structure and expanded flags. Every read projects
//! the current status map onto it, so callers always see live progress.

use crate::background::{auto_process_loop, watch_loop};
use crate::error::{CoreError, Result};
use core_async::runtime;
use core_async::sync::{broadcast, CancellationToken, Mutex as AsyncMutex};
use core_library::tree::{
    apply_status, build_tree, collect_file_paths, count_files, find_file, rebuild_tree,
    toggle_folder, visible_files,
};
use core_library::{FileEntry, FileStatusStore, FolderEntry};
use core_pipeline::{SummarizationOrchestrator, TranscriptionOrchestrator};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, DirectoryEvent, EventBus};
use core_runtime::logging::strip_path;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Files queued by one [`CoreService::process_pending`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub transcription: usize,
    pub summarization: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.transcription + self.summarization
    }
}

#[derive(Default)]
struct SessionState {
    root: Option<String>,
    tree: Option<FolderEntry>,
    error: Option<String>,
}

pub(crate) struct ServiceInner {
    config: CoreConfig,
    event_bus: EventBus,
    store: FileStatusStore,
    transcription: TranscriptionOrchestrator,
    summarization: SummarizationOrchestrator,
    session: Mutex<SessionState>,
    /// Serializes scans and root changes.
    scan_lock: AsyncMutex<()>,
    watch_token: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl ServiceInner {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watch_token(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.watch_token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DirectoryEvent) {
        let _ = self.event_bus.emit(CoreEvent::Directory(event));
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(token) = self.watch_token().take() {
            token.cancel();
        }
    }
}

/// Primary façade exposed to host applications.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Wires the configured bridges into a service with no directory open.
    ///
    /// With `auto_process` enabled and a runtime available, a background task
    /// queues newly eligible files whenever a transcript lands or files are
    /// reset.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::default();
        let store = FileStatusStore::new(
            Arc::clone(&config.settings_store),
            config.persistence.clone(),
            event_bus.clone(),
        );
        let transcription =
            TranscriptionOrchestrator::new(&config, store.clone(), event_bus.clone())?;
        let summarization =
            SummarizationOrchestrator::new(&config, store.clone(), event_bus.clone())?;

        let inner = Arc::new(ServiceInner {
            config,
            event_bus,
            store,
            transcription,
            summarization,
            session: Mutex::new(SessionState::default()),
            scan_lock: AsyncMutex::new(()),
            watch_token: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });

        if inner.config.auto_process {
            match runtime::current() {
                Some(handle) => {
                    handle.spawn(auto_process_loop(
                        Arc::downgrade(&inner),
                        inner.event_bus.subscribe(),
                        inner.shutdown.clone(),
                    ));
                }
                None => warn!("No async runtime; files are only queued after directory scans"),
            }
        }

        info!(
            auto_process = inner.config.auto_process,
            watch = inner.config.watch.enabled,
            transcription_engines = inner.config.transcription_engines.len(),
            summarization_engines = inner.config.summarization_engines.len(),
            "Core service ready"
        );
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn status_store(&self) -> &FileStatusStore {
        &self.inner.store
    }

    pub fn transcription(&self) -> &TranscriptionOrchestrator {
        &self.inner.transcription
    }

    pub fn summarization(&self) -> &SummarizationOrchestrator {
        &self.inner.summarization
    }

    /// Root of the open directory.
    pub fn root(&self) -> Option<String> {
        self.inner.session().root.clone()
    }

    /// Last scan or watch failure, cleared by the next successful scan.
    pub fn error(&self) -> Option<String> {
        self.inner.session().error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.session().error = None;
    }

    /// The open tree with live status. `None` when no directory is open; an
    /// empty directory yields an empty root folder.
    pub fn tree(&self) -> Option<FolderEntry> {
        let tree = self.inner.session().tree.clone()?;
        Some(apply_status(&tree, &self.inner.store.snapshot()))
    }

    /// Files not hidden by a collapsed folder, pre-order.
    pub fn visible_files(&self) -> Vec<FileEntry> {
        self.tree()
            .map(|tree| visible_files(&tree).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn file(&self, path: &str) -> Option<FileEntry> {
        self.tree()
            .and_then(|tree| find_file(&tree, path).cloned())
    }

    /// Flips one folder's expanded flag and returns the updated tree.
    pub fn toggle_folder(&self, folder_path: &str) -> Option<FolderEntry> {
        let tree = {
            let mut session = self.inner.session();
            let toggled = toggle_folder(session.tree.as_ref()?, folder_path);
            session.tree = Some(toggled.clone());
            toggled
        };
        Some(apply_status(&tree, &self.inner.store.snapshot()))
    }

    // ========================================================================
    // Directory lifecycle
    // ========================================================================

    /// Reopens the directory persisted by the previous run, after loading
    /// the persisted status map.
    pub async fn restore(&self) -> Result<Option<FolderEntry>> {
        match self.inner.store.load().await {
            Some(root) => {
                info!(root = %root, "Restoring previous directory");
                self.open_directory(&root).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Scans `root` and makes it the open directory.
    ///
    /// Status records of files no longer present are pruned here and only
    /// here. On a scan failure nothing changes except the session error.
    #[instrument(skip(self, root), fields(root = %root.as_ref().display()))]
    pub async fn open_directory(&self, root: impl AsRef<Path>) -> Result<FolderEntry> {
        let root_path = root.as_ref();
        let root = root_path.to_string_lossy().to_string();
        let _scan = self.inner.scan_lock.lock().await;

        let raw = self
            .inner
            .config
            .scanner
            .scan_tree(root_path)
            .await
            .map_err(|e| self.scan_failed(&root, e.to_string()))?;

        let previous_root = self.root();
        if previous_root.as_deref() != Some(root.as_str()) {
            self.stop_watching().await;
            if previous_root.is_some() {
                self.inner.transcription.queue().clear();
                self.inner.summarization.queue().clear();
                self.inner.store.end_session();
            }
        }

        let snapshot = self.inner.store.snapshot();
        let tree = build_tree(&raw, &snapshot);
        let pruned = self.inner.store.prune(&collect_file_paths(&tree));
        let file_count = count_files(&tree);
        {
            let mut session = self.inner.session();
            session.root = Some(root.clone());
            session.tree = Some(tree.clone());
            session.error = None;
        }
        self.inner.store.set_root_path(Some(&root)).await;

        let watching = self.inner.watch_token().is_some();
        if !watching {
            self.start_watching(&root).await;
        }

        info!(root = %root, files = file_count, pruned, "Directory opened");
        self.inner.emit(DirectoryEvent::Opened {
            root: root.clone(),
            file_count,
        });
        drop(_scan);

        self.auto_dispatch();
        Ok(apply_status(&tree, &self.inner.store.snapshot()))
    }

    /// Rescans the open directory, keeping collapsed folders collapsed.
    /// Records of vanished files are kept until the next open.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<FolderEntry> {
        let _scan = self.inner.scan_lock.lock().await;
        let (root, previous) = {
            let session = self.inner.session();
            let root = session.root.clone().ok_or(CoreError::NoDirectory)?;
            (root, session.tree.clone())
        };

        let raw = self
            .inner
            .config
            .scanner
            .scan_tree(Path::new(&root))
            .await
            .map_err(|e| self.scan_failed(&root, e.to_string()))?;

        let tree = rebuild_tree(&raw, &self.inner.store.snapshot(), previous.as_ref());
        let file_count = count_files(&tree);
        {
            let mut session = self.inner.session();
            session.tree = Some(tree.clone());
            session.error = None;
        }

        debug!(root = %root, files = file_count, "Directory refreshed");
        self.inner.emit(DirectoryEvent::Refreshed { root, file_count });
        drop(_scan);

        self.auto_dispatch();
        Ok(tree)
    }

    /// Forgets the open directory: stops watching, drops queued work and
    /// every status record, and clears the persisted root.
    ///
    /// Jobs already running finish, but their results are discarded: the
    /// queue forgets them and the store rejects their writes.
    pub async fn close_directory(&self) {
        let _scan = self.inner.scan_lock.lock().await;
        self.stop_watching().await;
        self.inner.transcription.queue().clear();
        self.inner.summarization.queue().clear();
        self.inner.store.clear().await;
        self.inner.store.set_root_path(None).await;

        let root = {
            let mut session = self.inner.session();
            session.tree = None;
            session.error = None;
            session.root.take()
        };
        if let Some(root) = root {
            info!(root = %root, "Directory closed");
            self.inner.emit(DirectoryEvent::Closed { root });
        }
    }

    fn scan_failed(&self, root: &str, message: String) -> CoreError {
        warn!(root = %root, error = %message, "Directory scan failed");
        self.inner.session().error = Some(format!("Failed to read directory: {message}"));
        self.inner.emit(DirectoryEvent::ScanFailed {
            root: root.to_string(),
            message: message.clone(),
        });
        CoreError::Scan {
            root: root.to_string(),
            message,
        }
    }

    // ========================================================================
    // Watching
    // ========================================================================

    async fn start_watching(&self, root: &str) {
        if !self.inner.config.watch.enabled {
            return;
        }
        let Some(watcher) = self.inner.config.watcher.clone() else {
            return;
        };

        match watcher.watch(Path::new(root)).await {
            Ok(events) => {
                let token = CancellationToken::new();
                *self.inner.watch_token() = Some(token.clone());
                core_async::task::spawn(watch_loop(
                    Arc::downgrade(&self.inner),
                    events,
                    self.inner.config.watch.settle_delay,
                    token,
                ));
                debug!(root = %root, "Watching directory");
            }
            Err(e) => {
                warn!(root = %root, error = %e, "Could not watch directory");
                self.inner.session().error = Some(format!("Failed to watch directory: {e}"));
                self.inner.emit(DirectoryEvent::ScanFailed {
                    root: root.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn stop_watching(&self) {
        let token = self.inner.watch_token().take();
        let Some(token) = token else {
            return;
        };
        token.cancel();
        if let Some(watcher) = &self.inner.config.watcher {
            if let Err(e) = watcher.stop().await {
                warn!(error = %e, "Stopping the directory watcher failed");
            }
        }
    }

    // ========================================================================
    // Processing
    // ========================================================================

    /// Queues every file eligible for transcription or summarization.
    pub fn process_pending(&self) -> Result<DispatchReport> {
        let Some(tree) = self.tree() else {
            return Ok(DispatchReport::default());
        };
        let report = DispatchReport {
            transcription: self.inner.transcription.dispatch(&tree)?,
            summarization: self.inner.summarization.dispatch(&tree)?,
        };
        if report.total() > 0 {
            debug!(
                transcription = report.transcription,
                summarization = report.summarization,
                "Dispatched pending files"
            );
        }
        Ok(report)
    }

    pub(crate) fn auto_dispatch(&self) {
        if !self.inner.config.auto_process {
            return;
        }
        if let Err(e) = self.process_pending() {
            warn!(error = %e, "Automatic dispatch failed");
        }
    }

    /// Drops the transcript and summary of one file and transcribes it again.
    /// Returns `false` while a job for the file is still running.
    pub fn retranscribe(&self, path: &str) -> Result<bool> {
        let mut file = self
            .file(path)
            .ok_or_else(|| CoreError::FileNotFound(path.to_string()))?;
        if self.inner.transcription.queue().is_active(path)
            || self.inner.summarization.queue().is_active(path)
        {
            return Ok(false);
        }

        self.inner.transcription.cancel(path);
        self.inner.summarization.cancel(path);
        self.inner.summarization.queue().reset_item(path);
        let record = self.inner.store.reset_file(path)?;
        file.apply_record(&record);

        info!(file = %strip_path(path), "Retranscribing");
        Ok(self.inner.transcription.submit(&file)?)
    }

    /// Drops the summary of one transcribed file and summarizes it again.
    /// Returns `false` while its summary job is still running.
    pub fn resummarize(&self, path: &str) -> Result<bool> {
        let transcribed = self
            .inner
            .store
            .get(path)
            .is_some_and(|record| record.has_transcript_text());
        if !transcribed {
            return Err(CoreError::NotEligible {
                action: "summarize",
                path: path.to_string(),
                reason: "it has no transcript yet".to_string(),
            });
        }
        if self.inner.summarization.queue().is_active(path) {
            return Ok(false);
        }

        self.inner.summarization.cancel(path);
        self.inner.store.reset_summary(path)?;
        info!(file = %strip_path(path), "Resummarizing");
        Ok(self.inner.summarization.submit(path)?)
    }

    /// Switches the transcription language and sends every finished or
    /// failed file back to pending so it is transcribed in the new language.
    /// Returns how many files were reset.
    pub fn set_transcription_language(&self, language: Option<String>) -> usize {
        self.inner.transcription.set_language(language);
        let reset = self.inner.store.reset_all_terminal();
        self.inner.transcription.queue().clear_completed();
        self.inner.summarization.queue().clear_completed();
        info!(reset, "Transcription language changed");
        self.auto_dispatch();
        reset
    }

    /// Language for summaries started from now on; `"auto"` follows the
    /// transcript.
    pub fn set_summary_language(&self, language: impl Into<String>) {
        self.inner.summarization.set_language(language);
    }

    /// Stops background work and writes any pending status change.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.stop_watching().await;
        self.inner.store.flush().await;
        info!("Core service stopped");
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("root", &self.root())
            .field("transcription", &self.inner.transcription)
            .field("summarization", &self.inner.summarization)
            .finish()
    }
}
