//! Conversation sessions: the log, its reconstruction, and its owners.

pub mod controller;
pub mod history;
pub mod model;
pub mod options;
pub mod parser;
#[allow(clippy::module_inception)]
pub mod session;
pub mod tasks;
pub mod tokens;

pub use controller::SessionController;
pub use model::{
    ChatFeatures, ChatMessage, ChatRole, CompletionRequest, ContentKind, ResponseTiming,
};
pub use options::{SessionOptions, OPTIONS_EMBED_FIELD, OPTIONS_FILENAME};
pub use session::{extract_title, ChatSession};
pub use tasks::IdempotentTasks;
