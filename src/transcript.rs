//! Transcript event model.
//!
//! The engine never inspects concrete platform types. Anything that can
//! present `{author, content, embeds, attachments, id, notice flag}` is
//! an acceptable transcript event, and that capability set is captured
//! by one concrete [`ThreadEvent`] struct. The host adapter resolves
//! attachment bytes before yielding an event, so the engine's only
//! suspension point while reading a transcript is
//! [`TranscriptSource::next_event`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Footer sentinel attached to every embed this system posts itself.
/// Events carrying it are echoes of our own output and are never
/// ingested back into a session log.
pub const SYSTEM_FOOTER: &str = "System message";

/// A participant referenced by a transcript event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAuthor {
    /// Stable platform identifier.
    pub id: u64,
    /// Display name, as it appears inside notice text.
    pub name: String,
    /// Whether this participant is an automated account.
    pub is_bot: bool,
}

impl EventAuthor {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_bot: false,
        }
    }

    pub fn bot(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_bot: true,
        }
    }

    /// Canonical mention form, the identity the model sees.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Kind of rich document attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    Article,
    Gifv,
    Image,
    Link,
    Rich,
    Video,
}

impl EmbedKind {
    /// Third-person description used when narrating the document.
    pub fn description(self) -> &'static str {
        match self {
            Self::Article => "an article",
            Self::Gifv => "a GIF",
            Self::Image => "an image",
            Self::Link => "a link",
            Self::Rich => "a Markdown document",
            Self::Video => "a video",
        }
    }
}

/// A rich embedded object on an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEmbed {
    pub kind: EmbedKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Name/value pairs, in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl EventEmbed {
    pub fn new(kind: EmbedKind) -> Self {
        Self {
            kind,
            title: None,
            description: None,
            url: None,
            fields: Vec::new(),
            footer: None,
        }
    }

    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Flatten the embed into plain text, one line per present part.
    pub fn to_plain_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        if let Some(title) = &self.title {
            lines.push(title.clone());
        }
        if let Some(url) = &self.url {
            lines.push(url.clone());
        }
        if let Some(description) = &self.description {
            lines.push(description.clone());
        }
        for (name, value) in &self.fields {
            lines.push(format!("{}: {}", name, value));
        }
        lines.join("\n")
    }
}

/// A binary attachment on an event, bytes already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAttachment {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl EventAttachment {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: Some(filename.into()),
            content_type: None,
            data,
        }
    }
}

/// A slash-command invocation that produced an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub invoker: EventAuthor,
    pub name: String,
}

/// One externally-observed conversation event.
#[derive(Debug, Clone, Default)]
pub struct ThreadEvent {
    /// Stable external identifier; shared by every log entry this event
    /// produces, which is what makes splicing-by-id possible.
    pub id: u64,
    pub author: Option<EventAuthor>,
    /// Textual content; for notices this is the platform's narration.
    pub content: String,
    /// Participants mentioned by the content.
    pub mentions: Vec<EventAuthor>,
    pub embeds: Vec<EventEmbed>,
    pub attachments: Vec<EventAttachment>,
    /// Set when the event was produced by a slash-command invocation.
    pub command: Option<CommandInvocation>,
    /// Platform-native notice ("user joined") rather than a message.
    pub notice: bool,
    /// Transient placeholder that will be edited into a real message.
    pub loading: bool,
}

impl ThreadEvent {
    pub fn message(id: u64, author: EventAuthor, content: impl Into<String>) -> Self {
        Self {
            id,
            author: Some(author),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn notice(id: u64, author: EventAuthor, content: impl Into<String>) -> Self {
        Self {
            id,
            author: Some(author),
            content: content.into(),
            notice: true,
            ..Self::default()
        }
    }

    /// Whether this event is an echo of the system's own output.
    pub fn is_system_echo(&self) -> bool {
        self.embeds
            .iter()
            .any(|e| e.footer.as_deref() == Some(SYSTEM_FOOTER))
    }
}

/// A lazy, restartable, oldest-first sequence of conversation events.
///
/// Implemented by the host platform adapter. `next_event` is a
/// suspension point; implementations resolve attachment bytes before
/// yielding so the engine never performs storage I/O itself.
#[async_trait]
pub trait TranscriptSource: Send {
    /// The next event in chronological order, or `None` at the end.
    async fn next_event(&mut self) -> Result<Option<ThreadEvent>>;
}
