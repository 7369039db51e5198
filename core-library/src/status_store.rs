//! # File Status Store
//!
//! Long-lived per-file processing state, keyed by absolute path.
//!
//! ## Overview
//!
//! The store is the source of truth for status, progress, errors, transcripts
//! and summaries. Trees are rebuilt from scans and re-attach these records by
//! path, so the records outlive rescans and (through the settings store)
//! restarts.
//!
//! ## Persistence
//!
//! - The root path is written immediately when it changes.
//! - The status map is written after a quiet period (`debounce`, 1 s by
//!   default). Each mutation cancels the scheduled write and schedules a new
//!   one; the write serializes the map as it is when the timer fires, so the
//!   final value of a rapidly changing field is never lost.
//! - [`FileStatusStore::flush`] writes immediately; call it on teardown.
//! - Loading is best-effort: unreadable or corrupt data yields an empty map.
//!
//! Write failures are logged and the in-memory state carries on.
//!
//! ## Sessions
//!
//! Jobs write through a handle from [`FileStatusStore::session`]. Once the
//! directory is closed or switched ([`FileStatusStore::end_session`], also
//! done by [`FileStatusStore::clear`]) those handles are rejected with
//! `LibraryError::SessionEnded`, so results of abandoned jobs never reach the
//! map or storage.
//!
//! ## Usage
//!
//! ```ignore
//! let store = FileStatusStore::new(settings_store, PersistenceSettings::default(), bus);
//! let root = store.load().await;
//!
//! store.update_status("/videos/talk.mp4", FileStatus::Transcribing, Some(40), None)?;
//! store.set_transcript("/videos/talk.mp4", transcript)?;
//! store.flush().await;
//! ```

use crate::error::{LibraryError, Result};
use crate::models::{FileStatus, StatusMap, StatusRecord, Summary, SummaryStatus, Transcript};

use bridge_traits::SettingsStore;
use core_async::runtime;
use core_async::sync::{CancellationToken, Mutex as AsyncMutex};
use core_async::time::timeout;
use core_runtime::config::PersistenceSettings;
use core_runtime::events::{CoreEvent, EventBus, StatusEvent};
use core_runtime::logging::strip_path;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Default)]
struct StoreState {
    records: StatusMap,
    root_path: Option<String>,
    /// Mutated since the last write
    dirty: bool,
    /// Bumped by `end_session`; bound handles of older sessions are rejected
    session: u64,
}

struct PendingWrite {
    id: u64,
    token: CancellationToken,
}

struct Inner {
    settings: Arc<dyn SettingsStore>,
    persistence: PersistenceSettings,
    event_bus: EventBus,
    state: Mutex<StoreState>,
    pending_write: Mutex<Option<PendingWrite>>,
    next_write_id: Mutex<u64>,
    /// Serializes writes so an older snapshot never lands after a newer one
    write_lock: AsyncMutex<()>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingWrite>> {
        self.pending_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_pending_write(&self) {
        if let Some(pending) = self.pending().take() {
            pending.token.cancel();
        }
    }

    fn emit(&self, event: StatusEvent) {
        // No subscribers is fine
        let _ = self.event_bus.emit(CoreEvent::Status(event));
    }

    async fn write_status_map(&self) {
        let _guard = self.write_lock.lock().await;
        let (json, count) = {
            let mut state = self.state();
            state.dirty = false;
            (serde_json::to_string(&state.records), state.records.len())
        };

        let json = match json {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize status map");
                return;
            }
        };

        match self
            .settings
            .set_string(&self.persistence.file_status_key, &json)
            .await
        {
            Ok(()) => debug!(records = count, "Status map persisted"),
            Err(e) => warn!(error = %e, "Failed to persist status map"),
        }
    }
}

/// Per-file status records with debounced persistence.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct FileStatusStore {
    inner: Arc<Inner>,
    /// Session this handle writes for; `None` writes unconditionally
    session: Option<u64>,
}

impl FileStatusStore {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        persistence: PersistenceSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                persistence,
                event_bus,
                state: Mutex::new(StoreState::default()),
                pending_write: Mutex::new(None),
                next_write_id: Mutex::new(0),
                write_lock: AsyncMutex::new(()),
            }),
            session: None,
        }
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Handle whose writes are accepted only until the current session ends.
    pub fn session(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            session: Some(self.inner.state().session),
        }
    }

    /// Ends the current session. Writes through handles obtained from
    /// [`session`](Self::session) before this call are rejected from now on.
    pub fn end_session(&self) {
        let mut state = self.inner.state();
        state.session += 1;
        debug!(session = state.session, "Status session ended");
    }

    /// False once the session this handle was bound to has ended.
    pub fn is_current(&self) -> bool {
        self.session
            .map_or(true, |session| session == self.inner.state().session)
    }

    // ========================================================================
    // Loading & root path
    // ========================================================================

    /// Loads the persisted root path and status map, replacing memory state.
    ///
    /// Read and parse failures are logged and yield empty state. Jobs that
    /// were running when the process stopped are put back to pending.
    /// Returns the persisted root path.
    pub async fn load(&self) -> Option<String> {
        let settings = &self.inner.settings;
        let keys = &self.inner.persistence;

        let root_path = match settings.get_string(&keys.root_path_key).await {
            Ok(root) => root.filter(|root| !root.trim().is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted root path");
                None
            }
        };

        let mut records = match settings.get_string(&keys.file_status_key).await {
            Ok(Some(json)) => match serde_json::from_str::<StatusMap>(&json) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Persisted status map is corrupt, starting empty");
                    StatusMap::new()
                }
            },
            Ok(None) => StatusMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted status map");
                StatusMap::new()
            }
        };

        let interrupted = requeue_interrupted(&mut records);
        info!(
            records = records.len(),
            interrupted,
            has_root = root_path.is_some(),
            "Status store loaded"
        );

        let mut state = self.inner.state();
        state.records = records;
        state.root_path = root_path.clone();
        state.dirty = interrupted > 0;
        root_path
    }

    pub fn root_path(&self) -> Option<String> {
        self.inner.state().root_path.clone()
    }

    /// Sets (or clears) the root path and writes it immediately.
    pub async fn set_root_path(&self, root: Option<&str>) {
        self.inner.state().root_path = root.map(str::to_string);

        let key = &self.inner.persistence.root_path_key;
        let result = match root {
            Some(root) => self.inner.settings.set_string(key, root).await,
            None => self.inner.settings.delete(key).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist root path");
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, path: &str) -> Option<StatusRecord> {
        self.inner.state().records.get(path).cloned()
    }

    /// Copy of the whole status map.
    pub fn snapshot(&self) -> StatusMap {
        self.inner.state().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Transcription status
    // ========================================================================

    /// Merges a status change into the record for `path`.
    ///
    /// `None` progress keeps the previous value. `None` error clears the
    /// previous error unless the new status is `Error`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when `Completed` is requested for a file without a
    /// transcript; use [`set_transcript`](Self::set_transcript) instead.
    pub fn update_status(
        &self,
        path: &str,
        status: FileStatus,
        progress: Option<u8>,
        error: Option<String>,
    ) -> Result<StatusRecord> {
        let record = self.mutate(path, |record| {
            if status == FileStatus::Completed && record.transcript.is_none() {
                return Err(LibraryError::InvalidTransition {
                    path: path.to_string(),
                    message: "a completed file needs a transcript".to_string(),
                });
            }
            record.status = status;
            if let Some(progress) = progress {
                record.progress = progress.min(100);
            }
            record.error = match error {
                Some(error) => Some(error),
                None if status == FileStatus::Error => record.error.take(),
                None => None,
            };
            Ok(())
        })?;

        debug!(file = %strip_path(path), status = %record.status, progress = record.progress, "Status updated");
        self.emit_updated(path, &record);
        Ok(record)
    }

    /// Stores a finished transcript: status `Completed`, progress 100, error
    /// cleared. Summary fields are left alone.
    pub fn set_transcript(&self, path: &str, transcript: Transcript) -> Result<StatusRecord> {
        let record = self.mutate(path, |record| {
            record.status = FileStatus::Completed;
            record.progress = 100;
            record.error = None;
            record.transcript = Some(transcript);
            Ok(())
        })?;
        self.emit_updated(path, &record);
        Ok(record)
    }

    /// Puts a file back to untouched pending, dropping transcript and summary.
    pub fn reset_file(&self, path: &str) -> Result<StatusRecord> {
        let record = self.mutate(path, |record| {
            record.reset();
            Ok(())
        })?;
        self.emit_updated(path, &record);
        self.emit_summary_updated(path, &record);
        Ok(record)
    }

    // ========================================================================
    // Summary status
    // ========================================================================

    /// Stores a finished summary: summary status `Completed`, error cleared.
    pub fn set_summary(&self, path: &str, summary: Summary) -> Result<StatusRecord> {
        let record = self.mutate(path, |record| {
            record.summary = Some(summary);
            record.summary_status = Some(SummaryStatus::Completed);
            record.summary_error = None;
            Ok(())
        })?;
        self.emit_summary_updated(path, &record);
        Ok(record)
    }

    /// Same merge rules as [`update_status`](Self::update_status), applied to
    /// the summary fields.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when `Completed` is requested without a summary.
    pub fn update_summary_status(
        &self,
        path: &str,
        status: SummaryStatus,
        error: Option<String>,
    ) -> Result<StatusRecord> {
        let record = self.mutate(path, |record| {
            if status == SummaryStatus::Completed && record.summary.is_none() {
                return Err(LibraryError::InvalidTransition {
                    path: path.to_string(),
                    message: "a completed summary status needs a summary".to_string(),
                });
            }
            record.summary_status = Some(status);
            record.summary_error = match error {
                Some(error) => Some(error),
                None if status == SummaryStatus::Error => record.summary_error.take(),
                None => None,
            };
            Ok(())
        })?;
        self.emit_summary_updated(path, &record);
        Ok(record)
    }

    /// Drops summary, summary status and summary error together.
    /// `Ok(None)` when there is no record for `path`.
    pub fn clear_summary(&self, path: &str) -> Result<Option<StatusRecord>> {
        self.mutate_existing(path, StatusRecord::clear_summary)
    }

    /// Drops the summary and marks it pending so it is generated again.
    pub fn reset_summary(&self, path: &str) -> Result<Option<StatusRecord>> {
        self.mutate_existing(path, |record| {
            record.summary = None;
            record.summary_status = Some(SummaryStatus::Pending);
            record.summary_error = None;
        })
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Resets every completed or failed file to pending/0, clearing transcript
    /// and all summary fields. Returns the number of records reset.
    pub fn reset_all_terminal(&self) -> usize {
        let count = {
            let mut state = self.inner.state();
            let mut count = 0;
            for record in state.records.values_mut() {
                if record.status.is_terminal() {
                    record.reset();
                    count += 1;
                }
            }
            if count > 0 {
                state.dirty = true;
            }
            count
        };

        if count > 0 {
            info!(count, "Reset finished files to pending");
            self.inner.emit(StatusEvent::Reset { count });
            self.schedule_persist();
        }
        count
    }

    /// Drops records whose path is not in `valid_paths`. Returns the number
    /// removed.
    pub fn prune(&self, valid_paths: &HashSet<String>) -> usize {
        let removed = {
            let mut state = self.inner.state();
            let before = state.records.len();
            state.records.retain(|path, _| valid_paths.contains(path));
            let removed = before - state.records.len();
            if removed > 0 {
                state.dirty = true;
            }
            removed
        };

        if removed > 0 {
            info!(removed, "Pruned status records for missing files");
            self.inner.emit(StatusEvent::Pruned { removed });
            self.schedule_persist();
        }
        removed
    }

    /// Drops every record and the persisted status map, ending the current
    /// session.
    ///
    /// A scheduled write is cancelled first so it cannot resurrect the map.
    pub async fn clear(&self) {
        self.inner.cancel_pending_write();
        {
            let mut state = self.inner.state();
            state.records.clear();
            state.dirty = false;
            state.session += 1;
        }

        let _guard = self.inner.write_lock.lock().await;
        if let Err(e) = self
            .inner
            .settings
            .delete(&self.inner.persistence.file_status_key)
            .await
        {
            warn!(error = %e, "Failed to delete persisted status map");
        }
        self.inner.emit(StatusEvent::Cleared);
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Writes the status map now if it changed since the last write.
    pub async fn flush(&self) {
        self.inner.cancel_pending_write();
        let dirty = self.inner.state().dirty;
        if dirty {
            self.inner.write_status_map().await;
        }
    }

    /// A debounced write is scheduled and has not fired yet.
    pub fn has_pending_write(&self) -> bool {
        self.inner.pending().is_some()
    }

    fn schedule_persist(&self) {
        let token = CancellationToken::new();
        let id = {
            let mut next = self
                .inner
                .next_write_id
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };

        let previous = self.inner.pending().replace(PendingWrite {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let Some(handle) = runtime::current() else {
            debug!("No async runtime, status map will be written on flush");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let debounce = inner.persistence.debounce;
        handle.spawn(async move {
            if timeout(debounce, token.cancelled()).await.is_ok() {
                return;
            }
            {
                let mut pending = inner.pending();
                if pending.as_ref().is_some_and(|p| p.id == id) {
                    *pending = None;
                }
            }
            inner.write_status_map().await;
        });
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Applies `apply` to the record for `path` (created if missing) under
    /// one lock. Nothing changes when the session check or `apply` fails.
    fn mutate<F>(&self, path: &str, apply: F) -> Result<StatusRecord>
    where
        F: FnOnce(&mut StatusRecord) -> Result<()>,
    {
        let record = {
            let mut state = self.inner.state();
            self.check_session(&state, path)?;
            let mut record = state.records.get(path).cloned().unwrap_or_default();
            apply(&mut record)?;
            state.records.insert(path.to_string(), record.clone());
            state.dirty = true;
            record
        };
        self.schedule_persist();
        Ok(record)
    }

    fn mutate_existing<F>(&self, path: &str, apply: F) -> Result<Option<StatusRecord>>
    where
        F: FnOnce(&mut StatusRecord),
    {
        let record = {
            let mut state = self.inner.state();
            self.check_session(&state, path)?;
            let Some(record) = state.records.get_mut(path) else {
                return Ok(None);
            };
            apply(record);
            let record = record.clone();
            state.dirty = true;
            record
        };
        self.schedule_persist();
        self.emit_summary_updated(path, &record);
        Ok(Some(record))
    }

    fn check_session(&self, state: &StoreState, path: &str) -> Result<()> {
        match self.session {
            Some(session) if session != state.session => Err(LibraryError::SessionEnded {
                path: path.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn emit_updated(&self, path: &str, record: &StatusRecord) {
        self.inner.emit(StatusEvent::Updated {
            path: path.to_string(),
            status: record.status.as_str().to_string(),
            progress: record.progress,
        });
    }

    fn emit_summary_updated(&self, path: &str, record: &StatusRecord) {
        self.inner.emit(StatusEvent::SummaryUpdated {
            path: path.to_string(),
            summary_status: record.summary_status.map(|s| s.as_str().to_string()),
        });
    }
}

/// Puts records of jobs that were running when the process stopped back to
/// pending. Returns how many records changed.
fn requeue_interrupted(records: &mut StatusMap) -> usize {
    let mut count = 0;
    for record in records.values_mut() {
        let mut changed = false;
        if record.status.is_in_progress() {
            record.status = FileStatus::Pending;
            record.progress = 0;
            changed = true;
        }
        if record.summary_status == Some(SummaryStatus::Summarizing) {
            record.summary_status = Some(SummaryStatus::Pending);
            changed = true;
        }
        if changed {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderInfo;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{SummaryProviderKind, TranscriptionProviderKind};
    use core_async::time::{sleep, Duration};
    use std::collections::HashMap;

    /// In-memory settings store that records every write.
    #[derive(Default)]
    struct RecordingSettings {
        values: Mutex<HashMap<String, String>>,
        writes: Mutex<Vec<(String, String)>>,
        fail_writes: bool,
        fail_reads: bool,
    }

    impl RecordingSettings {
        fn writes_to(&self, key: &str) -> Vec<String> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SettingsStore for RecordingSettings {
        async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
            if self.fail_writes {
                return Err(BridgeError::DatabaseError("disk full".to_string()));
            }
            self.writes
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_string()));
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
            if self.fail_reads {
                return Err(BridgeError::DatabaseError("locked".to_string()));
            }
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> BridgeResult<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(self.values.lock().unwrap().keys().cloned().collect())
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            self.values.lock().unwrap().clear();
            Ok(())
        }
    }

    const STATUS_KEY: &str = "clipflow.file_status";
    const ROOT_KEY: &str = "clipflow.root_path";

    fn store_with(settings: Arc<RecordingSettings>) -> FileStatusStore {
        FileStatusStore::new(
            settings,
            PersistenceSettings::default().with_debounce(Duration::from_millis(50)),
            EventBus::default(),
        )
    }

    fn transcript() -> Transcript {
        Transcript {
            segments: vec![],
            full_text: "Welcome to the show".to_string(),
            language: "en".to_string(),
            duration: 12.0,
            source: ProviderInfo::transcription(TranscriptionProviderKind::OpenAi, "whisper-1"),
        }
    }

    fn summary() -> Summary {
        Summary {
            text: "A show intro.".to_string(),
            language: "en".to_string(),
            source: ProviderInfo::summarization(SummaryProviderKind::Claude, "claude-3-haiku-20240307"),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_update_status_merges_progress_and_error() {
        let store = store_with(Arc::default());

        store
            .update_status("/a.mp4", FileStatus::Transcribing, Some(40), None)
            .unwrap();
        let record = store
            .update_status("/a.mp4", FileStatus::Transcribing, None, None)
            .unwrap();
        assert_eq!(record.progress, 40);

        store
            .update_status("/a.mp4", FileStatus::Error, None, Some("Network error".to_string()))
            .unwrap();
        let record = store.update_status("/a.mp4", FileStatus::Error, Some(0), None).unwrap();
        assert_eq!(record.error.as_deref(), Some("Network error"));

        let record = store.update_status("/a.mp4", FileStatus::Pending, None, None).unwrap();
        assert_eq!(record.error, None);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let store = store_with(Arc::default());
        let record = store
            .update_status("/a.mp4", FileStatus::Transcribing, Some(250), None)
            .unwrap();
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_completed_requires_transcript() {
        let store = store_with(Arc::default());
        assert!(matches!(
            store.update_status("/a.mp4", FileStatus::Completed, Some(100), None),
            Err(LibraryError::InvalidTransition { .. })
        ));
        assert!(store.get("/a.mp4").is_none());

        store.set_transcript("/a.mp4", transcript()).unwrap();
        assert!(store
            .update_status("/a.mp4", FileStatus::Completed, None, None)
            .is_ok());
    }

    #[test]
    fn test_set_transcript_marks_completed_and_keeps_summary() {
        let store = store_with(Arc::default());
        store
            .update_status("/a.mp4", FileStatus::Error, None, Some("boom".to_string()))
            .unwrap();
        store
            .update_summary_status("/a.mp4", SummaryStatus::Error, Some("rate".to_string()))
            .unwrap();

        let record = store.set_transcript("/a.mp4", transcript()).unwrap();
        assert_eq!(record.status, FileStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.error, None);
        assert_eq!(record.summary_status, Some(SummaryStatus::Error));
    }

    #[test]
    fn test_transcript_summary_clear_sequence() {
        let store = store_with(Arc::default());
        store.set_transcript("/a.mp4", transcript()).unwrap();
        store.set_summary("/a.mp4", summary()).unwrap();

        let record = store.get("/a.mp4").unwrap();
        assert_eq!(record.summary_status, Some(SummaryStatus::Completed));

        let record = store.clear_summary("/a.mp4").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Completed);
        assert!(record.transcript.is_some());
        assert_eq!(record.summary, None);
        assert_eq!(record.summary_status, None);
        assert_eq!(record.summary_error, None);
    }

    #[test]
    fn test_reset_summary_marks_pending() {
        let store = store_with(Arc::default());
        store.set_transcript("/a.mp4", transcript()).unwrap();
        store
            .update_summary_status("/a.mp4", SummaryStatus::Error, Some("Rate limited".to_string()))
            .unwrap();

        let record = store.reset_summary("/a.mp4").unwrap().unwrap();
        assert_eq!(record.summary_status, Some(SummaryStatus::Pending));
        assert_eq!(record.summary_error, None);
        assert!(store.reset_summary("/missing.mp4").unwrap().is_none());
    }

    #[test]
    fn test_summary_completed_requires_summary() {
        let store = store_with(Arc::default());
        store.set_transcript("/a.mp4", transcript()).unwrap();
        assert!(store
            .update_summary_status("/a.mp4", SummaryStatus::Completed, None)
            .is_err());
    }

    #[test]
    fn test_reset_all_terminal() {
        let store = store_with(Arc::default());
        store.set_transcript("/done.mp4", transcript()).unwrap();
        store.set_summary("/done.mp4", summary()).unwrap();
        store
            .update_status("/failed.mp4", FileStatus::Error, None, Some("x".to_string()))
            .unwrap();
        store
            .update_status("/running.mp4", FileStatus::Transcribing, Some(60), None)
            .unwrap();

        assert_eq!(store.reset_all_terminal(), 2);

        for path in ["/done.mp4", "/failed.mp4"] {
            assert_eq!(store.get(path).unwrap(), StatusRecord::default());
        }
        assert_eq!(store.get("/running.mp4").unwrap().progress, 60);
        assert_eq!(store.reset_all_terminal(), 0);
    }

    #[test]
    fn test_prune_keeps_nested_present_paths() {
        let store = store_with(Arc::default());
        for path in ["/r/a.mp3", "/r/x/y/z/deep.mp4", "/r/gone.mp4"] {
            store
                .update_status(path, FileStatus::Pending, Some(0), None)
                .unwrap();
        }

        let valid: HashSet<String> = ["/r/a.mp3", "/r/x/y/z/deep.mp4"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(store.prune(&valid), 1);
        assert!(store.get("/r/x/y/z/deep.mp4").is_some());
        assert!(store.get("/r/gone.mp4").is_none());
        assert_eq!(store.prune(&valid), 0);
    }

    #[core_async::test]
    async fn test_rapid_updates_persist_once_with_last_value() {
        let settings = Arc::new(RecordingSettings::default());
        let store = store_with(settings.clone());

        for progress in 0..=10u8 {
            store
                .update_status("/a.mp4", FileStatus::Transcribing, Some(progress * 10), None)
                .unwrap();
        }
        assert!(store.has_pending_write());
        assert!(settings.writes_to(STATUS_KEY).is_empty());

        sleep(Duration::from_millis(150)).await;

        let writes = settings.writes_to(STATUS_KEY);
        assert_eq!(writes.len(), 1);
        let persisted: StatusMap = serde_json::from_str(&writes[0]).unwrap();
        assert_eq!(persisted["/a.mp4"].progress, 100);
        assert!(!store.has_pending_write());
    }

    #[core_async::test]
    async fn test_flush_writes_immediately_and_cancels_timer() {
        let settings = Arc::new(RecordingSettings::default());
        let store = store_with(settings.clone());

        store
            .update_status("/a.mp4", FileStatus::Extracting, Some(5), None)
            .unwrap();
        store.flush().await;
        assert_eq!(settings.writes_to(STATUS_KEY).len(), 1);

        sleep(Duration::from_millis(120)).await;
        assert_eq!(settings.writes_to(STATUS_KEY).len(), 1);

        // Nothing changed, nothing to write
        store.flush().await;
        assert_eq!(settings.writes_to(STATUS_KEY).len(), 1);
    }

    #[test]
    fn test_flush_without_runtime_timer() {
        let settings = Arc::new(RecordingSettings::default());
        let store = store_with(settings.clone());

        store.set_transcript("/a.mp4", transcript()).unwrap();
        assert!(store.has_pending_write());

        core_async::runtime::block_on(store.flush());
        assert_eq!(settings.writes_to(STATUS_KEY).len(), 1);
    }

    #[core_async::test]
    async fn test_load_restores_and_requeues_interrupted() {
        let settings = Arc::new(RecordingSettings::default());
        let mut persisted = StatusMap::new();
        persisted.insert(
            "/a.mp4".to_string(),
            StatusRecord {
                status: FileStatus::Transcribing,
                progress: 70,
                ..StatusRecord::default()
            },
        );
        persisted.insert(
            "/b.mp4".to_string(),
            StatusRecord {
                status: FileStatus::Completed,
                progress: 100,
                transcript: Some(transcript()),
                summary_status: Some(SummaryStatus::Summarizing),
                ..StatusRecord::default()
            },
        );
        settings
            .set_string(STATUS_KEY, &serde_json::to_string(&persisted).unwrap())
            .await
            .unwrap();
        settings.set_string(ROOT_KEY, "/media").await.unwrap();

        let store = store_with(settings.clone());
        assert_eq!(store.load().await.as_deref(), Some("/media"));
        assert_eq!(store.root_path().as_deref(), Some("/media"));

        let a = store.get("/a.mp4").unwrap();
        assert_eq!((a.status, a.progress), (FileStatus::Pending, 0));
        let b = store.get("/b.mp4").unwrap();
        assert_eq!(b.status, FileStatus::Completed);
        assert_eq!(b.summary_status, Some(SummaryStatus::Pending));
    }

    #[core_async::test]
    async fn test_load_is_best_effort() {
        let settings = Arc::new(RecordingSettings::default());
        settings.set_string(STATUS_KEY, "{not json").await.unwrap();
        let store = store_with(settings);
        assert_eq!(store.load().await, None);
        assert!(store.is_empty());

        let failing = Arc::new(RecordingSettings {
            fail_reads: true,
            ..RecordingSettings::default()
        });
        let store = store_with(failing);
        assert_eq!(store.load().await, None);
        assert!(store.is_empty());
    }

    #[core_async::test]
    async fn test_root_path_written_immediately() {
        let settings = Arc::new(RecordingSettings::default());
        let store = store_with(settings.clone());

        store.set_root_path(Some("/media")).await;
        assert_eq!(settings.writes_to(ROOT_KEY), vec!["/media".to_string()]);

        store.set_root_path(None).await;
        assert_eq!(settings.get_string(ROOT_KEY).await.unwrap(), None);
        assert_eq!(store.root_path(), None);
    }

    #[core_async::test]
    async fn test_clear_cancels_pending_write() {
        let settings = Arc::new(RecordingSettings::default());
        let store = store_with(settings.clone());
        settings.set_string(STATUS_KEY, "{}").await.unwrap();

        store
            .update_status("/a.mp4", FileStatus::Extracting, None, None)
            .unwrap();
        store.clear().await;
        sleep(Duration::from_millis(120)).await;

        assert!(store.is_empty());
        assert_eq!(settings.writes_to(STATUS_KEY).len(), 1, "only the seed write");
        assert_eq!(settings.get_string(STATUS_KEY).await.unwrap(), None);
    }

    #[core_async::test]
    async fn test_write_failure_keeps_memory_state() {
        let settings = Arc::new(RecordingSettings {
            fail_writes: true,
            ..RecordingSettings::default()
        });
        let store = store_with(settings);

        store.set_transcript("/a.mp4", transcript()).unwrap();
        store.flush().await;

        assert_eq!(store.get("/a.mp4").unwrap().status, FileStatus::Completed);
    }

    #[core_async::test]
    async fn test_mutations_emit_events() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let store = FileStatusStore::new(
            Arc::new(RecordingSettings::default()),
            PersistenceSettings::default(),
            bus,
        );

        store
            .update_status("/a.mp4", FileStatus::Transcribing, Some(10), None)
            .unwrap();
        store.set_transcript("/a.mp4", transcript()).unwrap();
        store.set_summary("/a.mp4", summary()).unwrap();
        store.prune(&HashSet::new());

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Status(StatusEvent::Updated {
                path: "/a.mp4".to_string(),
                status: "transcribing".to_string(),
                progress: 10,
            })
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Status(StatusEvent::Updated { progress: 100, .. })
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Status(StatusEvent::SummaryUpdated {
                path: "/a.mp4".to_string(),
                summary_status: Some("completed".to_string()),
            })
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Status(StatusEvent::Pruned { removed: 1 })
        );
    }

    #[core_async::test]
    async fn test_ended_session_rejects_late_writes() {
        let settings = Arc::new(RecordingSettings::default());
        let store = store_with(settings.clone());
        let job = store.session();
        job.update_status("/old/a.mp4", FileStatus::Transcribing, Some(30), None)
            .unwrap();
        assert!(job.is_current());

        store.clear().await;
        assert!(!job.is_current());

        let late = job.set_transcript("/old/a.mp4", transcript());
        assert!(late.unwrap_err().is_session_ended());
        assert!(job
            .update_status("/old/a.mp4", FileStatus::Transcribing, Some(80), None)
            .unwrap_err()
            .is_session_ended());
        assert!(store.is_empty());
        assert!(!store.has_pending_write());

        sleep(Duration::from_millis(120)).await;
        assert_eq!(settings.get_string(STATUS_KEY).await.unwrap(), None);

        // Unbound handles and handles of the new session still write
        store.session().set_transcript("/new/b.mp4", transcript()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_end_session_keeps_records() {
        let store = store_with(Arc::default());
        let job = store.session();
        job.update_status("/a.mp4", FileStatus::Extracting, Some(0), None)
            .unwrap();

        store.end_session();

        assert!(job
            .update_summary_status("/a.mp4", SummaryStatus::Summarizing, None)
            .is_err());
        assert!(job.clear_summary("/a.mp4").is_err());
        assert_eq!(store.get("/a.mp4").unwrap().status, FileStatus::Extracting);
    }

    #[test]
    fn test_rejected_summary_transition_leaves_record_untouched() {
        let store = store_with(Arc::default());
        store
            .update_summary_status("/a.mp4", SummaryStatus::Error, Some("rate".to_string()))
            .unwrap();

        assert!(store
            .update_summary_status("/a.mp4", SummaryStatus::Completed, None)
            .is_err());
        let record = store.get("/a.mp4").unwrap();
        assert_eq!(record.summary_status, Some(SummaryStatus::Error));
        assert_eq!(record.summary_error.as_deref(), Some("rate"));

        assert!(store
            .update_summary_status("/none.mp4", SummaryStatus::Completed, None)
            .is_err());
        assert!(store.get("/none.mp4").is_none());
    }
}
