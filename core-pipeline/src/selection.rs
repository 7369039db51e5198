//! Provider selection.
//!
//! Selection runs when a job starts, not when it is queued, so a key added
//! or a model installed while files wait in the queue is picked up.

use bridge_traits::{
    SecureStore, SummarizationEngine, SummaryProviderKind, TranscriptionEngine,
    TranscriptionProviderKind,
};
use core_runtime::config::{SummarizationSettings, TranscriptionSettings};
use std::sync::Arc;
use tracing::{debug, warn};

/// Engine and model chosen for one transcription job.
#[derive(Clone)]
pub struct TranscriptionChoice {
    pub engine: Arc<dyn TranscriptionEngine>,
    pub model: String,
}

impl TranscriptionChoice {
    pub fn kind(&self) -> TranscriptionProviderKind {
        self.engine.kind()
    }
}

impl std::fmt::Debug for TranscriptionChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionChoice")
            .field("provider", &self.kind())
            .field("model", &self.model)
            .finish()
    }
}

/// Engine and model chosen for one summarization job.
#[derive(Clone)]
pub struct SummaryChoice {
    pub engine: Arc<dyn SummarizationEngine>,
    pub model: String,
}

impl SummaryChoice {
    pub fn kind(&self) -> SummaryProviderKind {
        self.engine.kind()
    }
}

impl std::fmt::Debug for SummaryChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryChoice")
            .field("provider", &self.kind())
            .field("model", &self.model)
            .finish()
    }
}

/// Display name used in user-facing messages.
pub fn transcription_label(kind: TranscriptionProviderKind) -> &'static str {
    match kind {
        TranscriptionProviderKind::Local => "Local Whisper",
        TranscriptionProviderKind::OpenAi => "OpenAI",
    }
}

/// Display name used in user-facing messages.
pub fn summary_label(kind: SummaryProviderKind) -> &'static str {
    match kind {
        SummaryProviderKind::Local => "Ollama",
        SummaryProviderKind::OpenAi => "OpenAI",
        SummaryProviderKind::Claude => "Claude",
    }
}

/// Whether the secure store holds a non-blank value for `key`. Store errors
/// count as "no credential".
pub async fn has_credential(secure_store: &dyn SecureStore, key: &str) -> bool {
    match secure_store.has_secret(key).await {
        Ok(present) => present,
        Err(e) => {
            warn!(key, error = %e, "Credential lookup failed");
            false
        }
    }
}

/// Picks the transcription engine for the next job.
///
/// The preferred provider is tried first and the other one second:
/// - local: usable when the engine is available and has an installed model.
///   The configured model wins if installed, otherwise the first installed.
/// - cloud: usable when its API key is present.
pub async fn select_transcription_provider(
    settings: &TranscriptionSettings,
    engines: &[Arc<dyn TranscriptionEngine>],
    secure_store: &dyn SecureStore,
) -> Option<TranscriptionChoice> {
    let order = match settings.preferred_provider {
        TranscriptionProviderKind::Local => [
            TranscriptionProviderKind::Local,
            TranscriptionProviderKind::OpenAi,
        ],
        TranscriptionProviderKind::OpenAi => [
            TranscriptionProviderKind::OpenAi,
            TranscriptionProviderKind::Local,
        ],
    };

    for kind in order {
        let Some(engine) = engines.iter().find(|engine| engine.kind() == kind) else {
            continue;
        };
        if let Some(model) = usable_model(engine.as_ref(), settings, secure_store).await {
            debug!(provider = %kind, model = %model, "Transcription provider selected");
            return Some(TranscriptionChoice {
                engine: Arc::clone(engine),
                model,
            });
        }
        debug!(provider = %kind, "Transcription provider not usable");
    }
    None
}

async fn usable_model(
    engine: &dyn TranscriptionEngine,
    settings: &TranscriptionSettings,
    secure_store: &dyn SecureStore,
) -> Option<String> {
    let kind = engine.kind();
    if let Some(key) = kind.credential_key() {
        return has_credential(secure_store, key)
            .await
            .then(|| settings.model_for(kind).to_string());
    }

    if !engine.is_available().await {
        return None;
    }
    let installed = match engine.installed_models().await {
        Ok(models) => models,
        Err(e) => {
            warn!(provider = %kind, error = %e, "Listing installed models failed");
            return None;
        }
    };
    let configured = settings.model_for(kind);
    if installed.iter().any(|model| model == configured) {
        Some(configured.to_string())
    } else {
        installed.into_iter().next()
    }
}

/// The configured summary provider, if one is selected and registered.
/// Credentials and reachability are checked by the job itself so it can
/// report which one failed.
pub fn select_summarization_provider(
    settings: &SummarizationSettings,
    engines: &[Arc<dyn SummarizationEngine>],
) -> Option<SummaryChoice> {
    let kind = settings.provider?;
    let engine = engines.iter().find(|engine| engine.kind() == kind)?;
    Some(SummaryChoice {
        engine: Arc::clone(engine),
        model: settings.model_for(kind).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        BridgeError, ProgressCallback, SummaryRequest, TranscriptionOutput, TranscriptionRequest,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySecrets(Mutex<HashMap<String, String>>);

    impl MemorySecrets {
        fn with(key: &str, value: &str) -> Self {
            let secrets = Self::default();
            secrets
                .0
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            secrets
        }
    }

    #[async_trait]
    impl SecureStore for MemorySecrets {
        async fn set_secret(&self, key: &str, value: &str) -> BridgeResult<()> {
            self.0
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<String>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    struct StubEngine {
        kind: TranscriptionProviderKind,
        available: bool,
        models: Vec<&'static str>,
    }

    #[async_trait]
    impl TranscriptionEngine for StubEngine {
        fn kind(&self) -> TranscriptionProviderKind {
            self.kind
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn installed_models(&self) -> BridgeResult<Vec<String>> {
            Ok(self.models.iter().map(|m| m.to_string()).collect())
        }

        async fn transcribe(
            &self,
            _request: TranscriptionRequest,
            _progress: ProgressCallback,
        ) -> BridgeResult<TranscriptionOutput> {
            Err(BridgeError::NotAvailable("stub".to_string()))
        }
    }

    struct StubSummarizer(SummaryProviderKind);

    #[async_trait]
    impl SummarizationEngine for StubSummarizer {
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

    fn engines(
        local_available: bool,
        local_models: Vec<&'static str>,
    ) -> Vec<Arc<dyn TranscriptionEngine>> {
        vec![
            Arc::new(StubEngine {
                kind: TranscriptionProviderKind::Local,
                available: local_available,
                models: local_models,
            }),
            Arc::new(StubEngine {
                kind: TranscriptionProviderKind::OpenAi,
                available: true,
                models: vec![],
            }),
        ]
    }

    #[core_async::test]
    async fn test_local_preferred_uses_configured_model() {
        let settings = TranscriptionSettings::default().with_local_model("small");
        let choice = select_transcription_provider(
            &settings,
            &engines(true, vec!["base", "small"]),
            &MemorySecrets::default(),
        )
        .await
        .unwrap();

        assert_eq!(choice.kind(), TranscriptionProviderKind::Local);
        assert_eq!(choice.model, "small");
    }

    #[core_async::test]
    async fn test_local_falls_back_to_first_installed_model() {
        let settings = TranscriptionSettings::default().with_local_model("large-v3");
        let choice = select_transcription_provider(
            &settings,
            &engines(true, vec!["tiny", "base"]),
            &MemorySecrets::default(),
        )
        .await
        .unwrap();

        assert_eq!(choice.model, "tiny");
    }

    #[core_async::test]
    async fn test_local_without_models_falls_back_to_cloud() {
        let settings = TranscriptionSettings::default();
        let secrets = MemorySecrets::with("openai_api_key", "sk-test");
        let choice = select_transcription_provider(&settings, &engines(true, vec![]), &secrets)
            .await
            .unwrap();

        assert_eq!(choice.kind(), TranscriptionProviderKind::OpenAi);
        assert_eq!(choice.model, "whisper-1");
    }

    #[core_async::test]
    async fn test_nothing_usable_selects_nothing() {
        let settings = TranscriptionSettings::default();
        let choice = select_transcription_provider(
            &settings,
            &engines(false, vec!["base"]),
            &MemorySecrets::default(),
        )
        .await;

        assert!(choice.is_none());
    }

    #[core_async::test]
    async fn test_cloud_preferred_uses_key_when_present() {
        let settings = TranscriptionSettings::default()
            .with_preferred_provider(TranscriptionProviderKind::OpenAi);
        let secrets = MemorySecrets::with("openai_api_key", "sk-test");
        let choice =
            select_transcription_provider(&settings, &engines(true, vec!["base"]), &secrets)
                .await
                .unwrap();

        assert_eq!(choice.kind(), TranscriptionProviderKind::OpenAi);
    }

    #[core_async::test]
    async fn test_cloud_preferred_without_key_falls_back_to_local() {
        let settings = TranscriptionSettings::default()
            .with_preferred_provider(TranscriptionProviderKind::OpenAi);
        let secrets = MemorySecrets::with("openai_api_key", "   ");
        let choice =
            select_transcription_provider(&settings, &engines(true, vec!["base"]), &secrets)
                .await
                .unwrap();

        assert_eq!(choice.kind(), TranscriptionProviderKind::Local);
        assert_eq!(choice.model, "base");
    }

    #[test]
    fn test_summary_provider_requires_selection_and_engine() {
        let engines: Vec<Arc<dyn SummarizationEngine>> =
            vec![Arc::new(StubSummarizer(SummaryProviderKind::Claude))];

        let none = SummarizationSettings::default().without_provider();
        assert!(select_summarization_provider(&none, &engines).is_none());

        let unregistered =
            SummarizationSettings::default().with_provider(SummaryProviderKind::OpenAi);
        assert!(select_summarization_provider(&unregistered, &engines).is_none());

        let claude = SummarizationSettings::default().with_provider(SummaryProviderKind::Claude);
        let choice = select_summarization_provider(&claude, &engines).unwrap();
        assert_eq!(choice.kind(), SummaryProviderKind::Claude);
        assert_eq!(choice.model, "claude-3-haiku-20240307");
    }

    #[test]
    fn test_labels() {
        assert_eq!(transcription_label(TranscriptionProviderKind::OpenAi), "OpenAI");
        assert_eq!(summary_label(SummaryProviderKind::Local), "Ollama");
    }
}
