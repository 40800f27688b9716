use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::services::providers::{ChatMessage, Role};

/// The system prompt is server-owned; callers may only replay the dialogue.
fn dialogue_roles_only(messages: &[ChatMessage]) -> Result<(), ValidationError> {
    if messages.iter().any(|m| m.role == Role::System) {
        let mut err = ValidationError::new("system_role");
        err.message = Some("messages may only have user or assistant roles".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct SummarizeRequest {
    #[serde(alias = "documentId")]
    pub document_id: Uuid,

    /// Prior conversation; empty means "summarize from scratch".
    #[serde(default)]
    #[validate(length(max = 100), custom(function = "dialogue_roles_only"))]
    pub messages: Vec<ChatMessage>,

    /// Extracted text to summarize directly.
    #[serde(default)]
    pub text: Option<String>,
}

impl SummarizeRequest {
    /// Conversation to send, without the system prompt.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        match self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => {
                let mut messages = self.messages.clone();
                messages.push(ChatMessage::user(format!(
                    "Please summarize this document: {}",
                    text
                )));
                messages
            }
            None => self.messages.clone(),
        }
    }
}

/// Payload of the final `done` event.
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryDoneEvent {
    pub summary_id: Uuid,
    pub document_id: Uuid,
}
