//! Error types for the thread-bot engine.

use thiserror::Error;

use crate::provider::ProviderError;

/// Result type alias using the thread-bot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the session engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The thread has no decodable bootstrap configuration; it is not a
    /// managed conversation. Cached by the controller until cleared.
    #[error("Invalid chat thread: {0}")]
    InvalidThread(u64),

    /// The estimated prompt already exceeds the model's context limit.
    #[error("Prompt of ~{estimated} tokens exceeds the {limit}-token limit of {model}")]
    BudgetExceeded {
        model: String,
        estimated: usize,
        limit: usize,
    },

    /// A completion request failed. The session log is left intact.
    #[error("Completion provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A history reconstruction was superseded by a newer attempt.
    /// Internal: callers of the controller never observe this variant,
    /// they rendezvous on the superseding attempt instead.
    #[error("History reconstruction was cancelled")]
    ReconstructionCancelled,

    /// The transcript source failed to produce an event.
    #[error("Transcript error: {0}")]
    Transcript(String),

    /// The emission sink rejected a transport unit.
    #[error("Emission error: {0}")]
    Emission(String),

    /// Bootstrap blob could not be serialized.
    #[error("Options serialization error: {0}")]
    Options(#[from] serde_yaml::Error),

    /// A reconstruction failure observed by every caller that was
    /// waiting on the same attempt.
    #[error("{0}")]
    Shared(std::sync::Arc<Error>),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error is the internal supersession signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::ReconstructionCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exceeded_display() {
        let err = Error::BudgetExceeded {
            model: "gpt-4".into(),
            estimated: 9000,
            limit: 8192,
        };
        let msg = err.to_string();
        assert!(msg.contains("9000"));
        assert!(msg.contains("8192"));
        assert!(msg.contains("gpt-4"));
    }

    #[test]
    fn with_context_chains() {
        let err = Error::Transcript("connection reset".into()).with_context("replaying thread 42");
        assert!(err.to_string().starts_with("replaying thread 42"));
    }

    #[test]
    fn cancellation_is_detectable() {
        assert!(Error::ReconstructionCancelled.is_cancellation());
        assert!(!Error::InvalidThread(1).is_cancellation());
    }
}
