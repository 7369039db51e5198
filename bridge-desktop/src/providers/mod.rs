//! HTTP clients for the transcription and summarization providers.
//!
//! API keys are read from the [`SecureStore`](bridge_traits::SecureStore) on
//! every call, so a key saved in settings takes effect without a restart.

mod claude;
mod ollama;
mod openai;
mod prompt;

pub use claude::ClaudeSummarizer;
pub use ollama::OllamaSummarizer;
pub use openai::{OpenAiSummarizer, OpenAiWhisperEngine, WHISPER_MAX_UPLOAD_BYTES};

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::SecureStore;
use reqwest::{Client, StatusCode};
use std::time::Duration;

const USER_AGENT: &str = concat!("clip-flow-core/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e)))
}

pub(crate) async fn require_key(
    store: &dyn SecureStore,
    key: &str,
    provider: &str,
) -> Result<String> {
    match store.get_secret(key).await? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BridgeError::MissingCredential {
            provider: provider.to_string(),
        }),
    }
}

pub(crate) fn network_error(provider: &str, error: reqwest::Error) -> BridgeError {
    BridgeError::Network(format!("{}: {}", provider, error))
}

/// Maps a non-success HTTP status to the matching bridge error.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> BridgeError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BridgeError::MissingCredential {
            provider: provider.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => BridgeError::RateLimited {
            provider: provider.to_string(),
        },
        StatusCode::PAYLOAD_TOO_LARGE => BridgeError::ProviderRejected(format!(
            "{} rejected the upload as too large",
            provider
        )),
        _ => BridgeError::ProviderRejected(format!(
            "{} returned {}: {}",
            provider,
            status,
            body.chars().take(300).collect::<String>()
        )),
    }
}
