//! OpenAI Whisper transcription and chat-completion summaries.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
    summarization::{SummarizationEngine, SummaryProviderKind, SummaryRequest},
    transcription::{
        ProgressCallback, TranscriptSegment, TranscriptionEngine, TranscriptionOutput,
        TranscriptionProgress, TranscriptionProviderKind, TranscriptionRequest,
        TranscriptionStage,
    },
};
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{build_client, network_error, prompt, require_key, status_error};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "OpenAI";

/// Whisper API upload limit.
pub const WHISPER_MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

const WHISPER_MODEL: &str = "whisper-1";

#[derive(Debug, Deserialize)]
struct WhisperVerboseResponse {
    text: String,
    segments: Option<Vec<WhisperSegment>>,
    language: Option<String>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// Cloud transcription through the Whisper API.
///
/// Uploads the file as-is; inputs larger than [`WHISPER_MAX_UPLOAD_BYTES`]
/// are rejected before any network traffic.
pub struct OpenAiWhisperEngine {
    client: Client,
    secure_store: Arc<dyn SecureStore>,
    base_url: String,
}

impl OpenAiWhisperEngine {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(600))?,
            secure_store,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TranscriptionEngine for OpenAiWhisperEngine {
    fn kind(&self) -> TranscriptionProviderKind {
        TranscriptionProviderKind::OpenAi
    }

    async fn is_available(&self) -> bool {
        self.secure_store
            .has_secret("openai_api_key")
            .await
            .unwrap_or(false)
    }

    async fn installed_models(&self) -> Result<Vec<String>> {
        Ok(vec![WHISPER_MODEL.to_string()])
    }

    fn max_input_bytes(&self) -> Option<u64> {
        Some(WHISPER_MAX_UPLOAD_BYTES)
    }

    #[instrument(skip(self, progress), fields(file = ?request.path.file_name()))]
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        progress: ProgressCallback,
    ) -> Result<TranscriptionOutput> {
        let api_key = require_key(self.secure_store.as_ref(), "openai_api_key", PROVIDER).await?;

        let size = tokio::fs::metadata(&request.path).await?.len();
        if size > WHISPER_MAX_UPLOAD_BYTES {
            return Err(BridgeError::InputTooLarge {
                size,
                limit: WHISPER_MAX_UPLOAD_BYTES,
            });
        }

        let buffer = tokio::fs::read(&request.path).await?;
        let filename = request
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let part = multipart::Part::bytes(buffer)
            .file_name(filename)
            .mime_str(mime_for(&request.path))
            .map_err(|e| network_error(PROVIDER, e))?;

        let model = if request.model.is_empty() {
            WHISPER_MODEL.to_string()
        } else {
            request.model.clone()
        };
        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", model)
            .text("response_format", "verbose_json");
        if let Some(language) = request.language.clone().filter(|l| l != "auto") {
            form = form.text("language", language);
        }

        progress(TranscriptionProgress {
            stage: TranscriptionStage::Transcribing,
            percent: 30,
        });

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let result: WhisperVerboseResponse = response
            .json()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        progress(TranscriptionProgress {
            stage: TranscriptionStage::Transcribing,
            percent: 100,
        });

        let segments = result
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptSegment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
            })
            .collect::<Vec<_>>();
        debug!(segments = segments.len(), "Whisper transcription finished");

        Ok(TranscriptionOutput {
            segments,
            full_text: result.text.trim().to_string(),
            language: result
                .language
                .or(request.language)
                .unwrap_or_else(|| "auto".to_string()),
            duration: result.duration.unwrap_or(0.0),
        })
    }
}

/// Summaries through the chat-completions API.
pub struct OpenAiSummarizer {
    client: Client,
    secure_store: Arc<dyn SecureStore>,
    base_url: String,
}

impl OpenAiSummarizer {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(120))?,
            secure_store,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SummarizationEngine for OpenAiSummarizer {
    fn kind(&self) -> SummaryProviderKind {
        SummaryProviderKind::OpenAi
    }

    async fn is_available(&self) -> bool {
        self.secure_store
            .has_secret("openai_api_key")
            .await
            .unwrap_or(false)
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn summarize(&self, request: SummaryRequest) -> Result<String> {
        let api_key = require_key(self.secure_store.as_ref(), "openai_api_key", PROVIDER).await?;

        let body = ChatRequest {
            model: request.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt::system_prompt(&request.language),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt::user_prompt(&request.text),
                },
            ],
            temperature: 0.3,
            max_tokens: 1000,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| BridgeError::ProviderRejected("OpenAI returned no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoSecrets;

    #[async_trait]
    impl SecureStore for NoSecrets {
        async fn set_secret(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn get_secret(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn delete_secret(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_mime_for_common_formats() {
        assert_eq!(mime_for(Path::new("a.MP3")), "audio/mpeg");
        assert_eq!(mime_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(mime_for(Path::new("a.wma")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_whisper_requires_credential() {
        let engine = OpenAiWhisperEngine::new(Arc::new(NoSecrets)).unwrap();
        assert!(!engine.is_available().await);
        assert_eq!(engine.max_input_bytes(), Some(WHISPER_MAX_UPLOAD_BYTES));

        let request = TranscriptionRequest {
            path: "/tmp/missing.mp3".into(),
            model: String::new(),
            language: None,
        };
        let err = engine.transcribe(request, Arc::new(|_| {})).await.unwrap_err();
        assert!(matches!(err, BridgeError::MissingCredential { .. }));
    }

    #[test]
    fn test_verbose_response_parses() {
        let json = r#"{"text":" hi there ","language":"english","duration":3.5,
            "segments":[{"id":0,"start":0.0,"end":1.5,"text":" hi"}]}"#;
        let parsed: WhisperVerboseResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.segments.unwrap().len(), 1);
        assert_eq!(parsed.duration, Some(3.5));
    }
}
