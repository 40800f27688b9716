//! LLM provider abstraction for streaming summaries.
//!
//! Handlers depend only on [`SummaryProvider`]; the concrete backend
//! (OpenAI or the in-process mock) is chosen from configuration.

pub mod mock;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

pub use mock::MockProvider;
pub use openai::OpenAiProvider;

/// Fixed instruction sent ahead of every conversation.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert document summarizer. \
Create clear, concise summaries that capture the main points. \
Use bullet points when appropriate and focus on key insights and actionable information.";

pub const DEFAULT_USER_PROMPT: &str = "Please provide a summary.";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Malformed stream: {0}")]
    Protocol(String),
}

impl ProviderError {
    /// Label used for the failure metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::NetworkError(_) => "network",
            ProviderError::Protocol(_) => "protocol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling settings forwarded to the provider.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
        }
    }
}

/// Stream chunk for streaming responses.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Next piece of generated text.
    Token(String),

    /// Provider signalled completion.
    Complete,
}

pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Prepends the system prompt to the caller's conversation.
pub fn build_conversation(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut conversation = Vec::with_capacity(messages.len() + 1);
    conversation.push(ChatMessage::system(SUMMARY_SYSTEM_PROMPT));
    if messages.is_empty() {
        conversation.push(ChatMessage::user(DEFAULT_USER_PROMPT));
    } else {
        conversation.extend(messages);
    }
    conversation
}

#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Start a streaming completion. Errors returned here happen before any
    /// token is produced; errors inside the stream happen mid-generation.
    async fn stream_summary(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError>;
}
