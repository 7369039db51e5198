//! Transcription Engine Abstraction
//!
//! A transcription engine turns an audio or video file into timed text
//! segments. Two kinds exist: a local model runner and a cloud API. Progress
//! is reported through a callback owned by the individual job, so concurrent
//! jobs never share a "current file".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{BridgeError, Result};

/// Which family of transcription engine handled (or should handle) a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionProviderKind {
    Local,
    #[serde(rename = "openai")]
    OpenAi,
}

impl TranscriptionProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionProviderKind::Local => "local",
            TranscriptionProviderKind::OpenAi => "openai",
        }
    }

    /// Secure-store key holding this provider's API key, if it needs one.
    pub fn credential_key(&self) -> Option<&'static str> {
        match self {
            TranscriptionProviderKind::Local => None,
            TranscriptionProviderKind::OpenAi => Some("openai_api_key"),
        }
    }
}

impl fmt::Display for TranscriptionProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranscriptionProviderKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(TranscriptionProviderKind::Local),
            "openai" => Ok(TranscriptionProviderKind::OpenAi),
            other => Err(BridgeError::NotAvailable(format!(
                "unknown transcription provider: {other}"
            ))),
        }
    }
}

/// One timed span of transcribed speech. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Input for a single transcription.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub path: PathBuf,
    pub model: String,
    /// ISO 639-1 code; `None` lets the engine detect the language.
    pub language: Option<String>,
}

/// Engine result for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionOutput {
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
    pub language: String,
    pub duration: f64,
}

/// Phase of a running transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStage {
    ExtractingAudio,
    Transcribing,
}

/// Progress report for one job. `percent` is overall progress, 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptionProgress {
    pub stage: TranscriptionStage,
    pub percent: u8,
}

/// Per-job progress callback.
pub type ProgressCallback = Arc<dyn Fn(TranscriptionProgress) + Send + Sync>;

/// Transcription engine trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transcription::{TranscriptionEngine, TranscriptionRequest};
///
/// async fn run(engine: &dyn TranscriptionEngine, request: TranscriptionRequest) -> Result<String> {
///     let output = engine.transcribe(request, Arc::new(|_| {})).await?;
///     Ok(output.full_text)
/// }
/// ```
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Engine family
    fn kind(&self) -> TranscriptionProviderKind;

    /// Whether the engine can currently run (binary present, daemon up, ...)
    async fn is_available(&self) -> bool;

    /// Models ready for use without a download
    async fn installed_models(&self) -> Result<Vec<String>>;

    /// Largest accepted input file, if the engine has a limit
    fn max_input_bytes(&self) -> Option<u64> {
        None
    }

    /// Transcribes one file, reporting progress through `progress`.
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        progress: ProgressCallback,
    ) -> Result<TranscriptionOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trips_through_str() {
        for kind in [TranscriptionProviderKind::Local, TranscriptionProviderKind::OpenAi] {
            assert_eq!(kind.as_str().parse::<TranscriptionProviderKind>().unwrap(), kind);
        }
        assert!("whisperx".parse::<TranscriptionProviderKind>().is_err());
    }

    #[test]
    fn test_only_cloud_needs_credential() {
        assert_eq!(TranscriptionProviderKind::Local.credential_key(), None);
        assert_eq!(
            TranscriptionProviderKind::OpenAi.credential_key(),
            Some("openai_api_key")
        );
    }

    #[test]
    fn test_provider_kind_serializes_lowercase() {
        let json = serde_json::to_string(&TranscriptionProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }
}
