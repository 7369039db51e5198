//! Failure categories of transcription and summarization jobs.
//!
//! Every job failure ends up as a short message on the file. The `Display`
//! text of [`JobFailure`] is that message.

use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

fn megabytes(bytes: &u64) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    #[error("This file has no audio track")]
    NoAudioStream,

    #[error("No API key configured for {provider}. Add one in settings.")]
    MissingCredential { provider: String },

    #[error("Network error: {0}. Check your connection and retry.")]
    Network(String),

    #[error("{provider} rate limit reached. Wait a moment and retry.")]
    RateLimited { provider: String },

    #[error("Model '{0}' is not installed")]
    ModelNotFound(String),

    #[error(
        "File is {:.1} MB, over the {:.0} MB upload limit. Use a local model for large files.",
        megabytes(.size),
        megabytes(.limit)
    )]
    FileTooLarge { size: u64, limit: u64 },

    #[error("{0}")]
    ProviderUnavailable(String),

    #[error("Timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

impl JobFailure {
    /// Stable category name for logs and events.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoAudioStream => "no_audio_stream",
            Self::MissingCredential { .. } => "missing_credential",
            Self::Network(_) => "network",
            Self::RateLimited { .. } => "rate_limited",
            Self::ModelNotFound(_) => "model_not_found",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::Timeout(_) => "timeout",
            Self::Failed(_) => "failed",
        }
    }

    /// Message stored on the file.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

impl From<BridgeError> for JobFailure {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::NoAudioStream(_) => Self::NoAudioStream,
            BridgeError::MissingCredential { provider } => Self::MissingCredential { provider },
            BridgeError::Network(message) => Self::Network(message),
            BridgeError::RateLimited { provider } => Self::RateLimited { provider },
            BridgeError::ModelNotFound(model) => Self::ModelNotFound(model),
            BridgeError::InputTooLarge { size, limit } => Self::FileTooLarge { size, limit },
            BridgeError::NotAvailable(message) => Self::ProviderUnavailable(message),
            BridgeError::Io(e) => Self::Failed(format!("Could not read the file: {}", e)),
            BridgeError::ProviderRejected(message)
            | BridgeError::OperationFailed(message)
            | BridgeError::DatabaseError(message) => Self::Failed(message),
        }
    }
}
