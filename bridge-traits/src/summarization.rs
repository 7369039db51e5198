//! Summarization Engine Abstraction
//!
//! Summarization engines turn a finished transcript into a short summary.
//! The desktop build ships a local daemon client and two cloud LLM clients.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryProviderKind {
    Local,
    #[serde(rename = "openai")]
    OpenAi,
    Claude,
}

impl SummaryProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryProviderKind::Local => "local",
            SummaryProviderKind::OpenAi => "openai",
            SummaryProviderKind::Claude => "claude",
        }
    }

    pub fn credential_key(&self) -> Option<&'static str> {
        match self {
            SummaryProviderKind::Local => None,
            SummaryProviderKind::OpenAi => Some("openai_api_key"),
            SummaryProviderKind::Claude => Some("claude_api_key"),
        }
    }
}

impl fmt::Display for SummaryProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryProviderKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "ollama" => Ok(SummaryProviderKind::Local),
            "openai" => Ok(SummaryProviderKind::OpenAi),
            "claude" => Ok(SummaryProviderKind::Claude),
            other => Err(BridgeError::NotAvailable(format!(
                "unknown summary provider: {other}"
            ))),
        }
    }
}

/// Input for one summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub text: String,
    /// Output language code, or `"auto"` to match the transcript.
    pub language: String,
    pub model: String,
}

/// Summarization engine trait
#[async_trait]
pub trait SummarizationEngine: Send + Sync {
    fn kind(&self) -> SummaryProviderKind;

    /// Whether the engine is reachable right now
    async fn is_available(&self) -> bool;

    /// Produces the summary text.
    async fn summarize(&self, request: SummaryRequest) -> Result<String>;
}
