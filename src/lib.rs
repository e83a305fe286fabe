//! Conversation-session engine for a chat-thread assistant.
//!
//! A thread's message history is the single source of truth: sessions
//! are rebuilt from the transcript on demand, live edits and deletions
//! are spliced into the in-memory log by external id, and replies are
//! chunked along Markdown block boundaries before they go back out.
//! The engine talks to hosts through two narrow seams, a transcript
//! source feeding platform events in and an emission sink carrying
//! transport units out, and to the completion backend through the
//! [`provider::Provider`] trait.

pub mod error;
pub mod format;
pub mod logging;
pub mod outbound;
pub mod provider;
pub mod session;
pub mod transcript;

pub use error::{Error, Result};
pub use format::MAX_MESSAGE_LENGTH;
pub use outbound::{EmissionSink, TransportUnit};
pub use session::{ChatSession, SessionController, SessionOptions};
pub use transcript::{ThreadEvent, TranscriptSource};
