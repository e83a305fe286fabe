//! Transcript parsing: one platform event into zero or more log entries.
//!
//! Text from the conversation owner or the assistant is kept verbatim.
//! Text from anyone else is attributed in third person. Rich and binary
//! content is narrated in third person from the platform's perspective
//! ("Discord: <user> sent an image ...") so the model sees a textual
//! rendering of everything that happened in the thread.

use crate::session::model::{ChatMessage, ChatRole, ContentKind};
use crate::transcript::{EventAttachment, EventAuthor, EventEmbed, ThreadEvent};

/// Narrate a rich embedded object.
fn embed_to_plain_text(role: ChatRole, author: &str, embed: &EventEmbed) -> ChatMessage {
    let content = format!(
        "Discord: {} sent {}:\n{}",
        author,
        embed.kind.description(),
        embed.to_plain_text()
    );
    ChatMessage::new(role, content).with_kind(ContentKind::Embed)
}

/// Narrate a binary attachment, inlining its content when it is text.
fn attachment_to_plain_text(
    role: ChatRole,
    author: &str,
    attachment: &EventAttachment,
) -> ChatMessage {
    let mut content = format!("Discord: {} uploaded a file. ", author);
    if let Some(filename) = &attachment.filename {
        content.push_str(&format!("Filename: {}. ", filename));
    }
    if let Some(content_type) = &attachment.content_type {
        content.push_str(&format!("Content type: {}. ", content_type));
    }
    let kind = match std::str::from_utf8(&attachment.data) {
        Ok(text) => {
            content.push_str(&format!("Content:\n\n{}", text));
            ContentKind::Plain
        }
        Err(_) => {
            content.push_str("Content: (binary).");
            ContentKind::Binary
        }
    };
    ChatMessage::new(role, content).with_kind(kind)
}

/// Substitute referenced participants' display names with their
/// canonical mention form.
fn canonicalize_mentions(content: &str, participants: &[&EventAuthor]) -> String {
    let mut content = content.to_string();
    for participant in participants {
        if !participant.name.is_empty() {
            content = content.replace(&participant.name, &participant.mention());
        }
    }
    content
}

/// Convert one transcript event into internal log entries.
///
/// Every produced entry carries the event's external id, so a later
/// edit or deletion splices them out as a unit. Returns an empty list
/// for the system's own echoes.
pub fn parse_event(user: &str, assistant: &str, event: &ThreadEvent) -> Vec<ChatMessage> {
    if event.is_system_echo() {
        return Vec::new();
    }

    let Some(author) = &event.author else {
        return Vec::new();
    };

    if event.notice {
        let participants: Vec<&EventAuthor> =
            std::iter::once(author).chain(event.mentions.iter()).collect();
        let content = canonicalize_mentions(&event.content, &participants);
        let message = ChatMessage::new(ChatRole::System, format!("Discord: {}", content))
            .with_external_id(event.id);
        return vec![message];
    }

    let author_mention = author.mention();
    let role = if author_mention == assistant {
        ChatRole::Assistant
    } else {
        ChatRole::User
    };

    let mut messages: Vec<ChatMessage> = Vec::new();

    if let Some(command) = &event.command {
        let content = format!(
            "{} used {} command from {}",
            command.invoker.mention(),
            command.name,
            author_mention
        );
        messages.push(ChatMessage::new(role, content));
    }

    if !event.content.is_empty() {
        let content = if author_mention != user && author_mention != assistant {
            format!("{} says: {}", author_mention, event.content)
        } else {
            event.content.clone()
        };
        messages.push(ChatMessage::new(role, content));
    }

    for embed in &event.embeds {
        messages.push(embed_to_plain_text(role, &author_mention, embed));
    }

    for attachment in &event.attachments {
        messages.push(attachment_to_plain_text(role, &author_mention, attachment));
    }

    for message in &mut messages {
        message.external_id = Some(event.id);
        tracing::debug!(%message, "parsed");
    }

    messages
}
