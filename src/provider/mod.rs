//! Completion-provider abstraction.
//!
//! One trait seam over chat-completion APIs with a consistent
//! request/response schema. Transport details (auth, retries, timeout
//! policy) live behind the implementation.

mod openai;

pub use openai::OpenAIProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::model::CompletionRequest;

/// Error from a completion provider. Recovered at the call site: a
/// failed completion aborts only the current turn.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Unified interface for chat-completion providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name, for logs and error reports.
    fn name(&self) -> &str;

    /// Send a chat completion request.
    async fn chat(&self, request: &CompletionRequest) -> Result<ChatResponse, ProviderError>;
}

/// A terminal chat-completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: TokenUsage,
}

impl ChatResponse {
    /// The content of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }

    /// The finish reason of the first choice, if any.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_accessors() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {"role": "assistant", "content": "hi"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        }))
        .unwrap();

        assert_eq!(response.content(), Some("hi"));
        assert_eq!(response.finish_reason(), Some("stop"));
        assert_eq!(response.usage.total_tokens, 12);
    }

    #[test]
    fn empty_choices_tolerated() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
        }))
        .unwrap();
        assert_eq!(response.content(), None);
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderError {
            provider: "openai".into(),
            model: "gpt-4".into(),
            message: "rate limited".into(),
            status_code: Some(429),
        };
        assert_eq!(err.to_string(), "[openai:gpt-4] rate limited");
    }
}
