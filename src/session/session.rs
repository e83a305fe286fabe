//! A chat session: the authoritative in-memory log of one conversation.
//!
//! The log lives behind a conversation-scoped lock; replay, live edits,
//! and deletions all mutate it through [`ChatSession::splice`], so
//! "rebuild from scratch" and "apply one edit" share one code path and
//! therefore one set of semantics. A session is created either fresh
//! from a command invocation or pre-populated by history replay, and is
//! dropped when the owning thread ends.

use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::format;
use crate::outbound::{EmissionSink, TransportUnit};
use crate::provider::{ChatResponse, Provider};
use crate::session::model::{ChatMessage, ChatRole, CompletionRequest, ResponseTiming};
use crate::session::options::SessionOptions;
use crate::session::parser::parse_event;
use crate::session::tokens;
use crate::transcript::ThreadEvent;

/// Fixed instruction for the one-shot title prompt.
const TITLE_PROMPT: &str = "Role: Copy editor\n\
    Task: The following conversation has been edited into a news article.\n\
    Please write an attractive title for it.\n\
    Requirements: Should be in the conversation's original language; \
    Must be a single sentence or phrase\n\
    Conversation:";

/// Titles often come back wrapped in symmetric quotes.
static QUOTED_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"(.*)"$|^'(.*)'$"#).unwrap());

#[derive(Debug)]
struct SessionState {
    /// The live, post-bootstrap log, in insertion order.
    messages: Vec<ChatMessage>,
    /// Last confirmed usage from a real response; 0 until one arrives.
    token_usage: usize,
    /// Running local estimate of `preset ++ live`, maintained
    /// incrementally by splice and never allowed to drift.
    token_estimate: usize,
}

#[derive(Debug)]
pub struct ChatSession {
    /// The assistant's canonical mention form.
    assistant: String,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

impl ChatSession {
    pub fn new(assistant: impl Into<String>, options: SessionOptions) -> Self {
        let token_estimate = tokens::estimate(&options.request.messages, &options.request.model);
        Self {
            assistant: assistant.into(),
            options,
            state: Mutex::new(SessionState {
                messages: Vec::new(),
                token_usage: 0,
                token_estimate,
            }),
        }
    }

    pub fn assistant(&self) -> &str {
        &self.assistant
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub async fn message_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// A copy of the live log, for inspection and export.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn token_estimate(&self) -> usize {
        self.state.lock().await.token_estimate
    }

    pub async fn token_usage(&self) -> usize {
        self.state.lock().await.token_usage
    }

    /// The number to budget against: whichever of the local estimate
    /// and the last confirmed usage is larger.
    pub async fn token_upper_bound(&self) -> usize {
        let state = self.state.lock().await;
        state.token_estimate.max(state.token_usage)
    }

    /// Human-readable usage, flagged while it is only an estimate.
    pub async fn usage_description(&self) -> String {
        let state = self.state.lock().await;
        if state.token_usage != state.token_estimate {
            format!("{} (estimated)", state.token_estimate.max(state.token_usage))
        } else {
            format!("{}", state.token_usage)
        }
    }

    /// Patch the log: replace the contiguous run of entries sharing
    /// `delete_id` with whatever `replacement` parses to. An absent run
    /// appends; an absent (or placeholder, or self-echo) replacement
    /// deletes. Returns whether any entry resulted, which is what
    /// decides if a reply should be considered.
    pub async fn splice(&self, delete_id: u64, replacement: Option<&ThreadEvent>) -> bool {
        let updated = match replacement {
            Some(event) if !event.loading && !event.is_system_echo() => {
                parse_event(&self.options.request.user, &self.assistant, event)
            }
            _ => Vec::new(),
        };

        let mut state = self.state.lock().await;

        let run: Vec<usize> = state
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.external_id == Some(delete_id))
            .map(|(i, _)| i)
            .collect();

        let produced = !updated.is_empty();
        let removed: Vec<ChatMessage> = match (run.first(), run.last()) {
            (Some(&first), Some(&last)) => state
                .messages
                .splice(first..=last, updated.iter().cloned())
                .collect(),
            _ => {
                state.messages.extend(updated.iter().cloned());
                Vec::new()
            }
        };

        let model = &self.options.request.model;
        let delta = tokens::estimate(&updated, model) as isize
            - tokens::estimate(&removed, model) as isize;
        state.token_estimate = (state.token_estimate as isize + delta).max(0) as usize;

        produced
    }

    /// Parse a live event and add it to the log.
    pub async fn process_event(&self, event: &ThreadEvent) -> bool {
        self.splice(event.id, Some(event)).await
    }

    /// Whether this event warrants a reply.
    pub fn should_answer(&self, event: &ThreadEvent) -> bool {
        // disregard all platform notifications
        if event.notice {
            return false;
        }
        let Some(author) = &event.author else {
            return false;
        };

        // ignore messages that open by addressing someone else
        // (like how tweets starting with @ are not shown to followers)
        for mentioned in &event.mentions {
            let mention = mentioned.mention();
            if mention == self.assistant {
                continue;
            }
            if event.content.starts_with(&mention) {
                return false;
            }
        }

        let features = self.options.features;
        // never respond to self
        let mut result = author.mention() != self.assistant;
        if features.response_timing == ResponseTiming::WhenMentioned {
            result = result && event.mentions.iter().any(|m| m.mention() == self.assistant);
        }
        if !features.respond_to_bots {
            result = result && !author.is_bot;
        }
        result
    }

    /// The full API payload: preset messages followed by the live log.
    pub async fn to_request(&self) -> CompletionRequest {
        let state = self.state.lock().await;
        let mut request = self.options.request.clone();
        request.messages = request
            .messages
            .iter()
            .chain(state.messages.iter())
            .cloned()
            .collect();
        request
    }

    /// Record confirmed usage and convert the response into transport
    /// units.
    pub async fn prepare_replies(&self, response: &ChatResponse) -> Vec<TransportUnit> {
        {
            let mut state = self.state.lock().await;
            state.token_usage = response.usage.total_tokens;
        }

        let Some(text) = response.content() else {
            return Vec::new();
        };

        if let Some(reason) = response.finish_reason() {
            if reason == "stop" {
                tracing::info!(finish_reason = %reason, "received response");
            } else {
                tracing::warn!(finish_reason = %reason, "response ended early");
            }
        }

        let units = format::chunk_message(text);
        tracing::info!(
            length = text.len(),
            units = units.len(),
            "parsed completion response"
        );
        units
    }

    /// Run one reply turn: clamp the budget, call the provider, and
    /// emit the chunked response. A provider failure emits a single
    /// failure notice and leaves the log untouched for the next turn.
    pub async fn answer(&self, provider: &dyn Provider, sink: &dyn EmissionSink) -> Result<bool> {
        let mut request = self.to_request().await;
        let upper_bound = self.token_upper_bound().await;

        if tokens::clamp_max_tokens(&mut request, upper_bound)? {
            tracing::warn!(
                max_tokens = ?request.max_tokens,
                "max_tokens was reduced to avoid exceeding the token limit"
            );
        }

        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            "sending completion request"
        );

        let response = match provider.chat(&request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "completion request failed");
                // a Notice unit, so the host attaches the system footer
                // and the echo is dropped on replay
                sink.emit(TransportUnit::notice(format!(
                    "Completion request failed: {}",
                    err
                )))
                .await?;
                return Ok(false);
            }
        };

        for unit in self.prepare_replies(&response).await {
            sink.emit(unit).await?;
        }

        self.warn_about_token_limit().await;
        Ok(true)
    }

    /// Ingest a live event and reply to it when it is answer-worthy.
    pub async fn read_chat(
        &self,
        event: &ThreadEvent,
        provider: &dyn Provider,
        sink: &dyn EmissionSink,
    ) -> Result<bool> {
        let produced = self.process_event(event).await;
        if !produced || !self.should_answer(event) {
            return Ok(false);
        }
        self.answer(provider, sink).await
    }

    async fn warn_about_token_limit(&self) {
        let upper_bound = self.token_upper_bound().await;
        let ratio = tokens::usage_ratio(upper_bound, &self.options.request.model);
        if ratio > tokens::SOFT_WARNING_RATIO {
            tracing::warn!(
                tokens = upper_bound,
                percent = (ratio * 100.0) as u32,
                "token usage is nearing the model's limit"
            );
        }
    }

    /// A derived, throwaway one-shot request whose sole prompt is the
    /// conversation so far plus an instruction to produce a short
    /// title. Never persisted.
    pub async fn title_request(&self) -> CompletionRequest {
        let state = self.state.lock().await;
        let conversation = state
            .messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(ChatMessage::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        let mut request = CompletionRequest::new("gpt-4", "user");
        request.temperature = 0.5;
        request.max_tokens = Some(64);
        request.messages = vec![
            ChatMessage::new(ChatRole::User, TITLE_PROMPT),
            ChatMessage::new(ChatRole::User, conversation),
            ChatMessage::new(ChatRole::User, "Answer:"),
        ];
        request
    }

    /// External ids of the trailing assistant run in the live log,
    /// oldest first. System narrations inside the run are skipped. Used
    /// by hosts to delete-and-regenerate the last response.
    pub async fn trailing_assistant_ids(&self) -> Vec<u64> {
        let state = self.state.lock().await;
        let mut ids: Vec<u64> = Vec::new();
        for message in state.messages.iter().rev() {
            match message.role {
                ChatRole::System => continue,
                ChatRole::Assistant => {
                    if let Some(id) = message.external_id {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                }
                ChatRole::User => break,
            }
        }
        ids.reverse();
        ids
    }
}

/// Strip symmetric surrounding quotes from a generated title.
pub fn extract_title(reply: &str) -> Option<String> {
    let reply = reply.trim();
    if reply.is_empty() {
        return None;
    }
    let title = match QUOTED_TITLE.captures(reply) {
        Some(captures) => captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or(reply),
        None => reply,
    };
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}
