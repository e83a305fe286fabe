//! Token accounting against a model's context limit.
//!
//! Counting follows the chat-markup accounting published for the
//! cl100k-era chat models: every message costs its role and content
//! tokens plus a fixed per-message overhead that differs between model
//! families, and every request pays a fixed reply-priming cost once.

use std::sync::LazyLock;

use tiktoken_rs::CoreBPE;

use crate::error::{Error, Result};
use crate::session::model::{ChatMessage, CompletionRequest};

/// Every reply is primed with `<|start|>assistant<|message|>`.
const REPLY_PRIMING_TOKENS: usize = 3;

/// Advisory threshold: callers warn above this fraction of the limit.
pub const SOFT_WARNING_RATIO: f64 = 0.75;

static TOKENIZER: LazyLock<CoreBPE> =
    LazyLock::new(|| tiktoken_rs::cl100k_base().expect("cl100k tokenizer data is bundled"));

/// Model family, the only dimension along which accounting differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// gpt-3.5 lineage: 4 extra tokens per message, 4096 context.
    Gpt35,
    /// gpt-4 lineage: 3 extra tokens per message, 8192 context.
    Gpt4,
}

impl ModelFamily {
    pub fn of(model: &str) -> Self {
        if model.starts_with("gpt-4") {
            Self::Gpt4
        } else {
            Self::Gpt35
        }
    }

    /// Fixed cost added for every message in the payload.
    pub fn tokens_per_message(self) -> usize {
        match self {
            Self::Gpt35 => 4,
            Self::Gpt4 => 3,
        }
    }

    /// The model's context limit, prompt and completion combined.
    pub fn token_limit(self) -> usize {
        match self {
            Self::Gpt35 => 4096,
            Self::Gpt4 => 8192,
        }
    }
}

fn token_count(text: &str) -> usize {
    TOKENIZER.encode_ordinary(text).len()
}

/// Estimate the token cost of a message list for the given model.
///
/// Pure in role + content: re-scanning a list always reproduces the sum
/// of its parts, which is what keeps the incremental splice accounting
/// drift-free.
pub fn estimate(messages: &[ChatMessage], model: &str) -> usize {
    let family = ModelFamily::of(model);
    let per_message = family.tokens_per_message();

    let mut total = REPLY_PRIMING_TOKENS;
    for message in messages {
        total += token_count(message.role.as_str());
        total += token_count(&message.content);
        total += per_message;
    }
    total
}

/// Clamp `max_tokens` to what the context limit leaves after the
/// prompt. Returns whether a clamp happened.
///
/// The remaining quota is rounded down to the nearest multiple of 10 to
/// compensate for estimator imprecision. A prompt that already exhausts
/// the limit is an error: it is never silently truncated.
pub fn clamp_max_tokens(request: &mut CompletionRequest, estimated_prompt: usize) -> Result<bool> {
    let limit = ModelFamily::of(&request.model).token_limit();

    if estimated_prompt >= limit {
        return Err(Error::BudgetExceeded {
            model: request.model.clone(),
            estimated: estimated_prompt,
            limit,
        });
    }

    let Some(max_tokens) = request.max_tokens else {
        return Ok(false);
    };

    let quota = (limit - estimated_prompt) as u32;
    if max_tokens > quota {
        request.max_tokens = Some(quota / 10 * 10);
        return Ok(true);
    }

    Ok(false)
}

/// Fraction of the model's context limit a token count occupies.
pub fn usage_ratio(token_count: usize, model: &str) -> f64 {
    token_count as f64 / ModelFamily::of(model).token_limit() as f64
}
