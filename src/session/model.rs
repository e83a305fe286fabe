//! Core conversation types: messages, request payloads, features.

use serde::{Deserialize, Serialize};

/// Message role in a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    /// String form used on the wire and in flattened renderings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// What a log entry's content was derived from. Bookkeeping only,
/// never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    #[default]
    Plain,
    Embed,
    Binary,
}

/// A single entry in the conversation log.
///
/// `external_id` ties the entry back to the transcript event that
/// produced it; entries without one are synthetic presets and are never
/// spliced. Only `role` and `content` reach the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,

    #[serde(skip)]
    pub external_id: Option<u64>,
    #[serde(skip)]
    pub kind: ContentKind,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            external_id: None,
            kind: ContentKind::Plain,
        }
    }

    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_external_id(mut self, id: u64) -> Self {
        self.external_id = Some(id);
        self
    }

    /// Equality by what the model sees. Used when comparing round-trips
    /// of the bootstrap blob, which never carries external ids.
    pub fn same_content(&self, other: &Self) -> bool {
        self.role == other.role && self.content == other.content
    }
}

impl std::fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.role.as_str(), self.content)
    }
}

fn default_user() -> String {
    "user".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

/// The completion request payload. Immutable once a session exists,
/// except for `max_tokens` which may be clamped downward at request
/// time by the token accountant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default = "default_user")]
    pub user: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            model: model.into(),
            max_tokens: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            messages: Vec::new(),
        }
    }
}

/// When the assistant volunteers a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseTiming {
    #[default]
    #[serde(rename = "immediately")]
    Immediately,
    #[serde(rename = "when mentioned")]
    WhenMentioned,
}

/// Feature switches governing answer-worthiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFeatures {
    #[serde(default)]
    pub response_timing: ResponseTiming,
    #[serde(default)]
    pub respond_to_bots: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_form() {
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(ChatRole::System.as_str(), "system");
    }

    #[test]
    fn message_display_is_flattened() {
        let msg = ChatMessage::new(ChatRole::User, "hi there");
        assert_eq!(msg.to_string(), "user: hi there");
    }

    #[test]
    fn same_content_ignores_external_id() {
        let a = ChatMessage::new(ChatRole::User, "x").with_external_id(1);
        let b = ChatMessage::new(ChatRole::User, "x").with_external_id(2);
        assert!(a.same_content(&b));
    }

    #[test]
    fn request_defaults() {
        let request: CompletionRequest =
            serde_json::from_value(serde_json::json!({"model": "gpt-4"})).unwrap();
        assert_eq!(request.user, "user");
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert!((request.top_p - 1.0).abs() < f32::EPSILON);
        assert!(request.max_tokens.is_none());
        assert!(request.messages.is_empty());
    }

    #[test]
    fn timing_wire_form_keeps_space() {
        assert_eq!(
            serde_json::to_string(&ResponseTiming::WhenMentioned).unwrap(),
            "\"when mentioned\""
        );
    }
}
