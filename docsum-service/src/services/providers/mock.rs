//! Deterministic provider for local development and tests.

use super::{
    ChatMessage, GenerationParams, ProviderError, ProviderStream, StreamChunk, SummaryProvider,
};
use async_trait::async_trait;

pub struct MockProvider {
    tokens: Vec<String>,
    fail_after: Option<usize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::with_tokens(["- Mock", " summary", " of", " the", " document."])
    }
}

impl MockProvider {
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            fail_after: None,
        }
    }

    /// Emit `n` tokens, then an error instead of completing.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }
}

#[async_trait]
impl SummaryProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn stream_summary(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError> {
        if messages.is_empty() {
            return Err(ProviderError::ApiError("no messages supplied".to_string()));
        }

        let mut chunks: Vec<Result<StreamChunk, ProviderError>> = Vec::new();
        match self.fail_after {
            Some(n) => {
                chunks.extend(
                    self.tokens
                        .iter()
                        .take(n)
                        .map(|t| Ok(StreamChunk::Token(t.clone()))),
                );
                chunks.push(Err(ProviderError::NetworkError(
                    "mock stream interrupted".to_string(),
                )));
            }
            None => {
                chunks.extend(self.tokens.iter().map(|t| Ok(StreamChunk::Token(t.clone()))));
                chunks.push(Ok(StreamChunk::Complete));
            }
        }

        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}
