//! # Core Configuration Module
//!
//! Provides configuration management for the Clip Flow core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every bridge and setting the core needs. It enforces
//! fail-fast validation so missing capabilities surface at startup instead of
//! on the first job.
//!
//! ## Required Dependencies
//!
//! - `SettingsStore` - Durable root path and status map
//! - `SecureStore` - Provider API keys
//! - `DirectoryScanner` - Raw directory snapshots
//!
//! ## Optional Dependencies
//!
//! - `DirectoryWatcher` - Change notifications (required while watching is enabled)
//! - `TranscriptionEngine`s - Local model runner, cloud API
//! - `SummarizationEngine`s - Local daemon, cloud LLMs
//!
//! When the `desktop-shims` feature is enabled, the keyring secure store, the
//! SQLite settings store, the filesystem scanner, the `notify` watcher, the
//! local whisper.cpp engine and the HTTP providers are injected automatically
//! if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, TranscriptionSettings};
//! use bridge_traits::TranscriptionProviderKind;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/clipflow.db")
//!     .transcription(
//!         TranscriptionSettings::default()
//!             .with_preferred_provider(TranscriptionProviderKind::OpenAi)
//!             .with_language("de"),
//!     )
//!     .auto_process(true)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! The builder validates required bridges and provides actionable error
//! messages when capabilities are missing:
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! // Without desktop-shims the stores and the scanner must be injected
//! let err = CoreConfig::builder().build().unwrap_err();
//! assert!(err.to_string().contains("Capability missing"));
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    DirectoryScanner, DirectoryWatcher, SecureStore, SettingsStore, SummarizationEngine,
    SummaryProviderKind, TranscriptionEngine, TranscriptionProviderKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default location of the settings database, relative to the working directory.
pub const DEFAULT_DATABASE_FILE: &str = "clipflow.db";

/// Settings key holding the last opened root directory.
pub const ROOT_PATH_KEY: &str = "clipflow.root_path";

/// Settings key holding the JSON status map.
pub const FILE_STATUS_KEY: &str = "clipflow.file_status";

const MAX_DEBOUNCE: Duration = Duration::from_secs(60);
const MAX_CONCURRENCY: usize = 16;

// ============================================================================
// Settings
// ============================================================================

/// Transcription policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionSettings {
    /// Provider tried first; the other one is the fallback.
    pub preferred_provider: TranscriptionProviderKind,
    /// Model passed to the local engine
    pub local_model: String,
    /// Model passed to the cloud engine
    pub cloud_model: String,
    /// Spoken language hint; `None` lets the engine detect it
    pub language: Option<String>,
    /// Maximum simultaneous transcription jobs
    pub max_concurrent: usize,
    /// Per-job timeout; `None` waits indefinitely
    pub job_timeout: Option<Duration>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            preferred_provider: TranscriptionProviderKind::Local,
            local_model: "base".to_string(),
            cloud_model: "whisper-1".to_string(),
            language: None,
            max_concurrent: 2,
            job_timeout: None,
        }
    }
}

impl TranscriptionSettings {
    pub fn with_preferred_provider(mut self, provider: TranscriptionProviderKind) -> Self {
        self.preferred_provider = provider;
        self
    }

    pub fn with_local_model(mut self, model: impl Into<String>) -> Self {
        self.local_model = model.into();
        self
    }

    pub fn with_cloud_model(mut self, model: impl Into<String>) -> Self {
        self.cloud_model = model.into();
        self
    }

    /// Sets the language hint. `"auto"` and empty strings mean detection.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.language = match language.trim() {
            "" | "auto" => None,
            other => Some(other.to_string()),
        };
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Model name for the given provider.
    pub fn model_for(&self, provider: TranscriptionProviderKind) -> &str {
        match provider {
            TranscriptionProviderKind::Local => &self.local_model,
            TranscriptionProviderKind::OpenAi => &self.cloud_model,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_ceiling("transcription", self.max_concurrent)?;
        validate_model("transcription.local_model", &self.local_model)?;
        validate_model("transcription.cloud_model", &self.cloud_model)?;
        validate_timeout("transcription", self.job_timeout)
    }
}

/// Summarization policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizationSettings {
    /// Selected provider; `None` disables summarization.
    pub provider: Option<SummaryProviderKind>,
    pub local_model: String,
    pub openai_model: String,
    pub claude_model: String,
    /// Summary language; `"auto"` follows the transcript
    pub language: String,
    /// Maximum simultaneous summarization jobs
    pub max_concurrent: usize,
    /// Per-job timeout; `None` waits indefinitely
    pub job_timeout: Option<Duration>,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            provider: None,
            local_model: "llama3.2".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            claude_model: "claude-3-haiku-20240307".to_string(),
            language: "auto".to_string(),
            max_concurrent: 3,
            job_timeout: None,
        }
    }
}

impl SummarizationSettings {
    pub fn with_provider(mut self, provider: SummaryProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn without_provider(mut self) -> Self {
        self.provider = None;
        self
    }

    pub fn with_model(mut self, provider: SummaryProviderKind, model: impl Into<String>) -> Self {
        let model = model.into();
        match provider {
            SummaryProviderKind::Local => self.local_model = model,
            SummaryProviderKind::OpenAi => self.openai_model = model,
            SummaryProviderKind::Claude => self.claude_model = model,
        }
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn model_for(&self, provider: SummaryProviderKind) -> &str {
        match provider {
            SummaryProviderKind::Local => &self.local_model,
            SummaryProviderKind::OpenAi => &self.openai_model,
            SummaryProviderKind::Claude => &self.claude_model,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_ceiling("summarization", self.max_concurrent)?;
        if let Some(provider) = self.provider {
            validate_model("summarization model", self.model_for(provider))?;
        }
        if self.language.trim().is_empty() {
            return Err(Error::Config(
                "Summary language cannot be empty; use \"auto\" to follow the transcript"
                    .to_string(),
            ));
        }
        validate_timeout("summarization", self.job_timeout)
    }
}

/// Status persistence settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceSettings {
    /// Quiet period before the status map is written
    pub debounce: Duration,
    pub root_path_key: String,
    pub file_status_key: String,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            root_path_key: ROOT_PATH_KEY.to_string(),
            file_status_key: FILE_STATUS_KEY.to_string(),
        }
    }
}

impl PersistenceSettings {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_keys(
        mut self,
        root_path_key: impl Into<String>,
        file_status_key: impl Into<String>,
    ) -> Self {
        self.root_path_key = root_path_key.into();
        self.file_status_key = file_status_key.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.debounce > MAX_DEBOUNCE {
            return Err(Error::Config(format!(
                "Persistence debounce of {:?} exceeds the maximum of {:?}",
                self.debounce, MAX_DEBOUNCE
            )));
        }
        if self.root_path_key.trim().is_empty() || self.file_status_key.trim().is_empty() {
            return Err(Error::Config(
                "Persistence keys cannot be empty".to_string(),
            ));
        }
        if self.root_path_key == self.file_status_key {
            return Err(Error::Config(format!(
                "Root path and status map cannot share the settings key '{}'",
                self.root_path_key
            )));
        }
        Ok(())
    }
}

/// Directory watching settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub enabled: bool,
    /// Bursts of change events closer together than this trigger one rescan
    pub settle_delay: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_delay: Duration::from_millis(500),
        }
    }
}

impl WatchSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

fn validate_ceiling(queue: &str, max_concurrent: usize) -> Result<()> {
    if max_concurrent == 0 {
        return Err(Error::Config(format!(
            "The {} concurrency ceiling must be at least 1",
            queue
        )));
    }
    if max_concurrent > MAX_CONCURRENCY {
        return Err(Error::Config(format!(
            "The {} concurrency ceiling of {} exceeds the maximum of {}",
            queue, max_concurrent, MAX_CONCURRENCY
        )));
    }
    Ok(())
}

fn validate_model(field: &str, model: &str) -> Result<()> {
    if model.trim().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn validate_timeout(queue: &str, timeout: Option<Duration>) -> Result<()> {
    if timeout == Some(Duration::ZERO) {
        return Err(Error::Config(format!(
            "The {} job timeout must be greater than zero; omit it to disable",
            queue
        )));
    }
    Ok(())
}

// ============================================================================
// CoreConfig
// ============================================================================

/// Core configuration for the Clip Flow core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path of the SQLite settings database (used by the desktop default store)
    pub database_path: PathBuf,

    pub secure_store: Arc<dyn SecureStore>,

    pub settings_store: Arc<dyn SettingsStore>,

    pub scanner: Arc<dyn DirectoryScanner>,

    pub watcher: Option<Arc<dyn DirectoryWatcher>>,

    /// Registered transcription engines, at most one per provider kind
    pub transcription_engines: Vec<Arc<dyn TranscriptionEngine>>,

    /// Registered summarization engines, at most one per provider kind
    pub summarization_engines: Vec<Arc<dyn SummarizationEngine>>,

    pub transcription: TranscriptionSettings,

    pub summarization: SummarizationSettings,

    pub persistence: PersistenceSettings,

    pub watch: WatchSettings,

    /// Dispatch eligible files automatically after every tree or status change
    pub auto_process: bool,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transcription_kinds: Vec<_> = self
            .transcription_engines
            .iter()
            .map(|engine| engine.kind())
            .collect();
        let summarization_kinds: Vec<_> = self
            .summarization_engines
            .iter()
            .map(|engine| engine.kind())
            .collect();

        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("secure_store", &"SecureStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("scanner", &"DirectoryScanner { ... }")
            .field(
                "watcher",
                &self.watcher.as_ref().map(|_| "DirectoryWatcher { ... }"),
            )
            .field("transcription_engines", &transcription_kinds)
            .field("summarization_engines", &summarization_kinds)
            .field("transcription", &self.transcription)
            .field("summarization", &self.summarization)
            .field("persistence", &self.persistence)
            .field("watch", &self.watch)
            .field("auto_process", &self.auto_process)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Engine registered for a transcription provider.
    pub fn transcription_engine(
        &self,
        kind: TranscriptionProviderKind,
    ) -> Option<Arc<dyn TranscriptionEngine>> {
        self.transcription_engines
            .iter()
            .find(|engine| engine.kind() == kind)
            .cloned()
    }

    /// Engine registered for a summarization provider.
    pub fn summarization_engine(
        &self,
        kind: SummaryProviderKind,
    ) -> Option<Arc<dyn SummarizationEngine>> {
        self.summarization_engines
            .iter()
            .find(|engine| engine.kind() == kind)
            .cloned()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Settings values are in range
    /// - At most one engine is registered per provider kind
    /// - The selected summary provider has a registered engine
    /// - Watching is only enabled with a watcher available
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.transcription.validate()?;
        self.summarization.validate()?;
        self.persistence.validate()?;

        let mut transcription_kinds = Vec::new();
        for engine in &self.transcription_engines {
            let kind = engine.kind();
            if transcription_kinds.contains(&kind) {
                return Err(Error::Config(format!(
                    "More than one transcription engine registered for '{}'",
                    kind
                )));
            }
            transcription_kinds.push(kind);
        }

        let mut summarization_kinds = Vec::new();
        for engine in &self.summarization_engines {
            let kind = engine.kind();
            if summarization_kinds.contains(&kind) {
                return Err(Error::Config(format!(
                    "More than one summarization engine registered for '{}'",
                    kind
                )));
            }
            summarization_kinds.push(kind);
        }

        if let Some(provider) = self.summarization.provider {
            if !summarization_kinds.contains(&provider) {
                return Err(Error::CapabilityMissing {
                    capability: "SummarizationEngine".to_string(),
                    message: format!(
                        "Summary provider '{}' is selected but no engine is registered for it. \
                         Register one with .summarization_engine() or clear the provider.",
                        provider
                    ),
                });
            }
        }

        if self.watch.enabled && self.watcher.is_none() {
            return Err(Error::Config(
                "Directory watching enabled but no DirectoryWatcher provided. \
                 Disable watching or inject a DirectoryWatcher implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Platform defaults
// ============================================================================

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str, desktop_default: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: ensure the 'desktop-shims' feature is enabled to use the default {}. \
             Other hosts: inject a platform implementation.",
            capability, purpose, desktop_default
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing(
        "SecureStore",
        "provider API keys",
        "KeyringSecureStore",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(database_path: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use core_async::runtime::{Builder, Handle};

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        Ok(runtime.block_on(SqliteSettingsStore::new(path))?)
    };

    // block_on panics inside a runtime, so build on a fresh thread there
    let path = database_path.to_path_buf();
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(
    _database_path: &std::path::Path,
) -> Result<Arc<dyn SettingsStore>> {
    Err(capability_missing(
        "SettingsStore",
        "the root path and status map",
        "SqliteSettingsStore",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_scanner() -> Result<Arc<dyn DirectoryScanner>> {
    let scanner: Arc<dyn DirectoryScanner> = Arc::new(bridge_desktop::FsDirectoryScanner::new());
    Ok(scanner)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_scanner() -> Result<Arc<dyn DirectoryScanner>> {
    Err(capability_missing(
        "DirectoryScanner",
        "reading media directories",
        "FsDirectoryScanner",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_watcher() -> Option<Arc<dyn DirectoryWatcher>> {
    let watcher: Arc<dyn DirectoryWatcher> = Arc::new(bridge_desktop::NotifyDirectoryWatcher::new());
    Some(watcher)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_watcher() -> Option<Arc<dyn DirectoryWatcher>> {
    None
}

/// Adds the HTTP-backed providers for kinds the caller did not register.
#[cfg(feature = "desktop-shims")]
fn provide_default_engines(
    secure_store: &Arc<dyn SecureStore>,
    transcription_engines: &mut Vec<Arc<dyn TranscriptionEngine>>,
    summarization_engines: &mut Vec<Arc<dyn SummarizationEngine>>,
) -> Result<()> {
    use bridge_desktop::{
        ClaudeSummarizer, LocalWhisperEngine, OllamaSummarizer, OpenAiSummarizer,
        OpenAiWhisperEngine,
    };

    let registered: Vec<TranscriptionProviderKind> =
        transcription_engines.iter().map(|engine| engine.kind()).collect();
    if !registered.contains(&TranscriptionProviderKind::Local) {
        transcription_engines.push(Arc::new(LocalWhisperEngine::new()?));
    }
    if !registered.contains(&TranscriptionProviderKind::OpenAi) {
        let engine = OpenAiWhisperEngine::new(Arc::clone(secure_store))?;
        transcription_engines.push(Arc::new(engine));
    }

    let registered: Vec<SummaryProviderKind> =
        summarization_engines.iter().map(|engine| engine.kind()).collect();
    if !registered.contains(&SummaryProviderKind::Local) {
        summarization_engines.push(Arc::new(OllamaSummarizer::new()?));
    }
    if !registered.contains(&SummaryProviderKind::OpenAi) {
        let engine = OpenAiSummarizer::new(Arc::clone(secure_store))?;
        summarization_engines.push(Arc::new(engine));
    }
    if !registered.contains(&SummaryProviderKind::Claude) {
        let engine = ClaudeSummarizer::new(Arc::clone(secure_store))?;
        summarization_engines.push(Arc::new(engine));
    }

    Ok(())
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_engines(
    _secure_store: &Arc<dyn SecureStore>,
    _transcription_engines: &mut Vec<Arc<dyn TranscriptionEngine>>,
    _summarization_engines: &mut Vec<Arc<dyn SummarizationEngine>>,
) -> Result<()> {
    Ok(())
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    scanner: Option<Arc<dyn DirectoryScanner>>,
    watcher: Option<Arc<dyn DirectoryWatcher>>,
    transcription_engines: Vec<Arc<dyn TranscriptionEngine>>,
    summarization_engines: Vec<Arc<dyn SummarizationEngine>>,
    transcription: TranscriptionSettings,
    summarization: SummarizationSettings,
    persistence: PersistenceSettings,
    watch: Option<WatchSettings>,
    auto_process: bool,
}

impl CoreConfigBuilder {
    /// Sets the settings database path (default: `clipflow.db`).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn scanner(mut self, scanner: Arc<dyn DirectoryScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn watcher(mut self, watcher: Arc<dyn DirectoryWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Registers a transcription engine, e.g. the host's local model runner.
    pub fn transcription_engine(mut self, engine: Arc<dyn TranscriptionEngine>) -> Self {
        self.transcription_engines.push(engine);
        self
    }

    pub fn summarization_engine(mut self, engine: Arc<dyn SummarizationEngine>) -> Self {
        self.summarization_engines.push(engine);
        self
    }

    pub fn transcription(mut self, settings: TranscriptionSettings) -> Self {
        self.transcription = settings;
        self
    }

    pub fn summarization(mut self, settings: SummarizationSettings) -> Self {
        self.summarization = settings;
        self
    }

    pub fn persistence(mut self, settings: PersistenceSettings) -> Self {
        self.persistence = settings;
        self
    }

    /// Sets watch settings. When not called, watching is enabled only if a
    /// watcher is available.
    pub fn watch(mut self, settings: WatchSettings) -> Self {
        self.watch = Some(settings);
        self
    }

    pub fn auto_process(mut self, enabled: bool) -> Self {
        self.auto_process = enabled;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if a required bridge is missing and no platform
    /// default exists, or if a setting is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self
            .database_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE));

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&database_path)?,
        };

        let scanner = match self.scanner {
            Some(scanner) => scanner,
            None => provide_default_scanner()?,
        };

        let watcher = self.watcher.or_else(provide_default_watcher);
        let watch = self.watch.unwrap_or(WatchSettings {
            enabled: watcher.is_some(),
            ..WatchSettings::default()
        });

        let mut transcription_engines = self.transcription_engines;
        let mut summarization_engines = self.summarization_engines;
        provide_default_engines(
            &secure_store,
            &mut transcription_engines,
            &mut summarization_engines,
        )?;

        let config = CoreConfig {
            database_path,
            secure_store,
            settings_store,
            scanner,
            watcher,
            transcription_engines,
            summarization_engines,
            transcription: self.transcription,
            summarization: self.summarization,
            persistence: self.persistence,
            watch,
            auto_process: self.auto_process,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        FileChangeEvent, ProgressCallback, RawNode, SummaryRequest, TranscriptionOutput,
        TranscriptionRequest,
    };
    use core_async::sync::mpsc;
    use std::path::Path;

    struct MockSecureStore;

    #[async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockSettingsStore;

    #[async_trait]
    impl SettingsStore for MockSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(vec![])
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockScanner;

    #[async_trait]
    impl DirectoryScanner for MockScanner {
        async fn scan_tree(&self, root: &Path) -> BridgeResult<RawNode> {
            let path = root.to_string_lossy().to_string();
            Ok(RawNode::folder(path.clone(), path, vec![]))
        }
    }

    struct MockWatcher;

    #[async_trait]
    impl DirectoryWatcher for MockWatcher {
        async fn watch(&self, _root: &Path) -> BridgeResult<mpsc::UnboundedReceiver<FileChangeEvent>> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(rx)
        }

        async fn stop(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockTranscriber(TranscriptionProviderKind);

    #[async_trait]
    impl TranscriptionEngine for MockTranscriber {
        fn kind(&self) -> TranscriptionProviderKind {
            self.0
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn installed_models(&self) -> BridgeResult<Vec<String>> {
            Ok(vec!["base".to_string()])
        }

        async fn transcribe(
            &self,
            _request: TranscriptionRequest,
            _progress: ProgressCallback,
        ) -> BridgeResult<TranscriptionOutput> {
            Ok(TranscriptionOutput {
                segments: vec![],
                full_text: String::new(),
                language: "en".to_string(),
                duration: 0.0,
            })
        }
    }

    struct MockSummarizer(SummaryProviderKind);

    #[async_trait]
    impl SummarizationEngine for MockSummarizer {
        fn kind(&self) -> SummaryProviderKind {
            self.0
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn summarize(&self, _request: SummaryRequest) -> BridgeResult<String> {
            Ok("summary".to_string())
        }
    }

    fn base_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/tmp/clipflow-test.db")
            .secure_store(Arc::new(MockSecureStore))
            .settings_store(Arc::new(MockSettingsStore))
            .scanner(Arc::new(MockScanner))
            .watcher(Arc::new(MockWatcher))
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = base_builder().build().unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/clipflow-test.db"));
        assert!(config.watch.enabled);
        assert!(!config.auto_process);
        assert_eq!(config.transcription.max_concurrent, 2);
        assert_eq!(config.summarization.max_concurrent, 3);
        assert_eq!(config.persistence.debounce, Duration::from_secs(1));
        assert_eq!(config.persistence.root_path_key, "clipflow.root_path");
        assert_eq!(config.persistence.file_status_key, "clipflow.file_status");
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_scanner() {
        let result = CoreConfig::builder()
            .secure_store(Arc::new(MockSecureStore))
            .settings_store(Arc::new(MockSettingsStore))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "DirectoryScanner")
            }
            other => panic!("expected missing scanner, got {:?}", other),
        }
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_settings_store() {
        let result = CoreConfig::builder()
            .secure_store(Arc::new(MockSecureStore))
            .scanner(Arc::new(MockScanner))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "SettingsStore"
        ));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_watching_defaults_off_without_watcher() {
        let config = CoreConfig::builder()
            .secure_store(Arc::new(MockSecureStore))
            .settings_store(Arc::new(MockSettingsStore))
            .scanner(Arc::new(MockScanner))
            .build()
            .unwrap();

        assert!(config.watcher.is_none());
        assert!(!config.watch.enabled);
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_FILE));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let dir = std::env::temp_dir().join(format!("clipflow-config-{}", std::process::id()));
        let config = CoreConfig::builder()
            .database_path(dir.join("settings.db"))
            .build()
            .unwrap();

        assert!(config.watcher.is_some());
        assert!(config.transcription_engine(TranscriptionProviderKind::OpenAi).is_some());
        assert!(config.summarization_engine(SummaryProviderKind::Claude).is_some());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_watching_requires_watcher() {
        let config = CoreConfig {
            watcher: None,
            watch: WatchSettings::default(),
            ..base_builder().build().unwrap()
        };

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let result = base_builder()
            .transcription(TranscriptionSettings::default().with_max_concurrent(0))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("transcription")));

        let result = base_builder()
            .summarization(SummarizationSettings::default().with_max_concurrent(0))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("summarization")));
    }

    #[test]
    fn test_validate_rejects_excessive_debounce() {
        let result = base_builder()
            .persistence(PersistenceSettings::default().with_debounce(Duration::from_secs(120)))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_shared_storage_key() {
        let result = base_builder()
            .persistence(PersistenceSettings::default().with_keys("same", "same"))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("same")));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let result = base_builder()
            .transcription(TranscriptionSettings::default().with_job_timeout(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_selected_summary_provider_needs_engine() {
        let builder = base_builder()
            .summarization(SummarizationSettings::default().with_provider(SummaryProviderKind::Claude));

        #[cfg(not(feature = "desktop-shims"))]
        assert!(matches!(
            builder.build(),
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "SummarizationEngine"
        ));

        #[cfg(feature = "desktop-shims")]
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_registered_engines_are_found_by_kind() {
        let config = base_builder()
            .transcription_engine(Arc::new(MockTranscriber(TranscriptionProviderKind::Local)))
            .summarization_engine(Arc::new(MockSummarizer(SummaryProviderKind::Local)))
            .summarization(SummarizationSettings::default().with_provider(SummaryProviderKind::Local))
            .build()
            .unwrap();

        let local = config
            .transcription_engine(TranscriptionProviderKind::Local)
            .unwrap();
        assert_eq!(local.kind(), TranscriptionProviderKind::Local);
        assert!(config.summarization_engine(SummaryProviderKind::Local).is_some());
    }

    #[test]
    fn test_duplicate_engine_kind_is_rejected() {
        let result = base_builder()
            .transcription_engine(Arc::new(MockTranscriber(TranscriptionProviderKind::Local)))
            .transcription_engine(Arc::new(MockTranscriber(TranscriptionProviderKind::Local)))
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("local")));
    }

    #[test]
    fn test_transcription_language_auto_means_detect() {
        let settings = TranscriptionSettings::default().with_language("auto");
        assert_eq!(settings.language, None);

        let settings = TranscriptionSettings::default().with_language("de");
        assert_eq!(settings.language.as_deref(), Some("de"));
    }

    #[test]
    fn test_model_lookup_per_provider() {
        let transcription = TranscriptionSettings::default().with_local_model("small");
        assert_eq!(transcription.model_for(TranscriptionProviderKind::Local), "small");
        assert_eq!(
            transcription.model_for(TranscriptionProviderKind::OpenAi),
            "whisper-1"
        );

        let summarization =
            SummarizationSettings::default().with_model(SummaryProviderKind::Claude, "claude-3-5-sonnet");
        assert_eq!(
            summarization.model_for(SummaryProviderKind::Claude),
            "claude-3-5-sonnet"
        );
        assert_eq!(summarization.model_for(SummaryProviderKind::Local), "llama3.2");
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = base_builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("SecureStore { ... }"));
        assert!(debug.contains("auto_process: false"));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = base_builder().auto_process(true).build().unwrap();
        let cloned = config.clone();
        assert!(cloned.auto_process);
        assert!(Arc::ptr_eq(&config.scanner, &cloned.scanner));
    }
}
