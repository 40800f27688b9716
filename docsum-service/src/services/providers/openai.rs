//! OpenAI Chat Completions provider.
//!
//! Sends the conversation with `stream: true` and forwards each
//! `choices[0].delta.content` fragment until the `[DONE]` sentinel.

use super::{
    ChatMessage, GenerationParams, ProviderError, ProviderStream, StreamChunk, SummaryProvider,
};
use crate::config::LlmConfig;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub struct OpenAiProvider {
    client: Client,
    api_key: Secret<String>,
    api_base: String,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }
}

#[async_trait]
impl SummaryProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn stream_summary(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }

        let request = ChatCompletionRequest {
            model: &params.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: true,
        };

        tracing::debug!(
            model = %params.model,
            message_count = messages.len(),
            "Starting streaming request to OpenAI"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "OpenAI API error {}: {}",
                status, error_text
            )));
        }

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::NetworkError(e.to_string())))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(line) = take_line(&mut buffer) {
                    match parse_sse_line(line.trim_end()) {
                        Some(Ok(StreamChunk::Complete)) => {
                            let _ = tx.send(Ok(StreamChunk::Complete)).await;
                            return;
                        }
                        Some(item) => {
                            // Receiver gone means the client disconnected.
                            if tx.send(item).await.is_err() {
                                return;
                            }
                        }
                        None => {}
                    }
                }
            }

            let _ = tx
                .send(Err(ProviderError::Protocol(
                    "stream ended before completion".to_string(),
                )))
                .await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Remove and decode the next complete line. Bytes after the last `\n` stay
/// buffered, so a character split across network reads is decoded whole.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let line_end = buffer.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=line_end).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// Interpret one SSE line. Returns `None` for keep-alives, comments and
/// deltas that carry no text.
pub(crate) fn parse_sse_line(line: &str) -> Option<Result<StreamChunk, ProviderError>> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(Ok(StreamChunk::Complete));
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(ProviderError::Protocol(e.to_string()))),
    };

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(|content| Ok(StreamChunk::Token(content)))
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}
