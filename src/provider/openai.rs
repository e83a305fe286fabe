//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use super::{ChatResponse, Provider, ProviderError};
use crate::session::model::CompletionRequest;

/// Client for the OpenAI chat-completions API (or any compatible
/// endpoint given a custom base URL).
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new provider against api.openai.com.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com")
    }

    /// Create with a custom base URL (Azure or compatible APIs).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn error(&self, request: &CompletionRequest, message: String, status: Option<u16>) -> ProviderError {
        ProviderError {
            provider: self.name().to_string(),
            model: request.model.clone(),
            message,
            status_code: status,
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.error(request, format!("Request failed: {}", e), None))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(
                request,
                format!("API error: {}", body),
                Some(status.as_u16()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| self.error(request, format!("Failed to parse response: {}", e), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::{ChatMessage, ChatRole};

    #[test]
    fn request_serializes_to_wire_format() {
        let mut request = CompletionRequest::new("gpt-4", "<@100>");
        request.max_tokens = Some(256);
        request
            .messages
            .push(ChatMessage::new(ChatRole::User, "Hello"));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["user"], "<@100>");
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        // internal bookkeeping never reaches the wire
        assert!(json["messages"][0].get("external_id").is_none());
    }

    #[test]
    fn omitted_max_tokens_not_serialized() {
        let request = CompletionRequest::new("gpt-4", "<@100>");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("max_tokens").is_none());
    }
}
