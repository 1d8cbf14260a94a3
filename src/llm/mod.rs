//! Chat model abstraction and the throttled, rate-limit-aware completion wrapper.

mod client;
mod openai;

pub use client::{is_rate_limit_text, parse_retry_after, LlmClient, RetryPolicy};
pub use openai::OpenAiChatModel;

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

/// A single chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Trait for chat completion backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier recorded in the audit trail.
    fn model_id(&self) -> &str;

    /// Send one completion request and return the text of the first choice.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Strip a markdown code fence wrapped around a model response.
pub fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }

    // Drop the opening fence line (which may carry a language tag).
    let body = match text.find('\n') {
        Some(pos) => &text[pos + 1..],
        None => return "",
    };

    let body = body.trim_end();
    match body.strip_suffix("```") {
        Some(inner) => inner.trim_end(),
        None => body,
    }
}
