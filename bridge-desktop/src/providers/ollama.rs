//! Local summaries through an Ollama daemon.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    summarization::{SummarizationEngine, SummaryProviderKind, SummaryRequest},
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{build_client, network_error, prompt, status_error};

const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const PROVIDER: &str = "Ollama";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

pub struct OllamaSummarizer {
    client: Client,
    base_url: String,
}

impl OllamaSummarizer {
    pub fn new() -> Result<Self> {
        Self::with_base_url(OLLAMA_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            // Local models on CPU can take minutes for a long transcript
            client: build_client(Duration::from_secs(900))?,
            base_url: base_url.into(),
        })
    }

    /// Names of the models pulled into the daemon.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl SummarizationEngine for OllamaSummarizer {
    fn kind(&self) -> SummaryProviderKind {
        SummaryProviderKind::Local
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .is_ok()
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn summarize(&self, request: SummaryRequest) -> Result<String> {
        let body = GenerateRequest {
            model: &request.model,
            prompt: prompt::completion_prompt(&request.text, &request.language),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BridgeError::ModelNotFound(request.model));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;
        debug!(chars = result.response.len(), "Ollama summary finished");
        Ok(result.response.trim().to_string())
    }
}
