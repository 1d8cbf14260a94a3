//! OpenAI chat completions backend.

use super::{is_rate_limit_text, parse_retry_after, ChatMessage, ChatModel, ChatRole};
use crate::config::LlmSettings;
use crate::error::{LlmError, Result};
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Create an OpenAI client with a custom timeout.
fn create_client(config: OpenAIConfig, timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Map an OpenAI error onto the rate-limit / other split the throttle cares about.
fn classify_error(err: OpenAIError) -> LlmError {
    let message = err.to_string();
    if is_rate_limit_text(&message) {
        LlmError::RateLimited {
            retry_after: parse_retry_after(&message),
            message,
        }
    } else {
        LlmError::Request(message)
    }
}

fn to_request_message(message: &ChatMessage) -> std::result::Result<ChatCompletionRequestMessage, LlmError> {
    let built: ChatCompletionRequestMessage = match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.as_str())
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.as_str())
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?
            .into(),
    };
    Ok(built)
}

/// Chat model backed by the OpenAI (or a compatible) chat completions API.
pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    /// Create a model from settings. Without an api key, `OPENAI_API_KEY` is used.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let mut config = OpenAIConfig::default();
        if let Some(base) = &settings.api_base {
            config = config.with_api_base(base);
        }
        if let Some(key) = &settings.api_key {
            config = config.with_api_key(key);
        }

        let client = create_client(config, Duration::from_secs(settings.timeout_seconds))?;
        Ok(Self {
            client,
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> std::result::Result<String, LlmError> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(classify_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        debug!("LLM response: {}", content.chars().take(300).collect::<String>());
        Ok(content)
    }
}
