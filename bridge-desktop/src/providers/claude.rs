//! Claude summaries through the Messages API.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
    summarization::{SummarizationEngine, SummaryProviderKind, SummaryRequest},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use super::{build_client, network_error, prompt, require_key, status_error};

const CLAUDE_API_BASE: &str = "https://api.anthropic.com/v1";
const CLAUDE_API_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "Claude";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    system: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

pub struct ClaudeSummarizer {
    client: Client,
    secure_store: Arc<dyn SecureStore>,
    base_url: String,
}

impl ClaudeSummarizer {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(120))?,
            secure_store,
            base_url: CLAUDE_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn join_text(blocks: Vec<ContentBlock>) -> String {
    blocks
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl SummarizationEngine for ClaudeSummarizer {
    fn kind(&self) -> SummaryProviderKind {
        SummaryProviderKind::Claude
    }

    async fn is_available(&self) -> bool {
        self.secure_store
            .has_secret("claude_api_key")
            .await
            .unwrap_or(false)
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn summarize(&self, request: SummaryRequest) -> Result<String> {
        let api_key = require_key(self.secure_store.as_ref(), "claude_api_key", PROVIDER).await?;

        let body = MessageRequest {
            model: &request.model,
            system: prompt::system_prompt(&request.language),
            messages: vec![Message {
                role: "user",
                content: prompt::user_prompt(&request.text),
            }],
            max_tokens: 1000,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", CLAUDE_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let result: MessageResponse = response
            .json()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        let text = join_text(result.content);
        if text.trim().is_empty() {
            return Err(BridgeError::ProviderRejected(
                "Claude returned an empty summary".to_string(),
            ));
        }
        Ok(text.trim().to_string())
    }
}
