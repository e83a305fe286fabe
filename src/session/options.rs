//! The bootstrap configuration blob.
//!
//! A session's options are persisted as a YAML attachment on the first
//! managed event of a thread; reconstruction after a restart decodes it
//! back. Older blobs in the wild use deprecated field spellings, which
//! are migrated once at decode time so nothing downstream ever sees
//! them.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::model::{ChatFeatures, CompletionRequest, ResponseTiming};
use crate::transcript::ThreadEvent;

/// Filename of the bootstrap attachment.
pub const OPTIONS_FILENAME: &str = "session.yaml";

/// Embed field older bootstrap events stored their parameters under.
pub const OPTIONS_EMBED_FIELD: &str = "Parameters";

/// Everything needed to (re)construct a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    pub request: CompletionRequest,
    #[serde(default)]
    pub features: ChatFeatures,
}

impl SessionOptions {
    pub fn new(request: CompletionRequest) -> Self {
        Self {
            request,
            features: ChatFeatures::default(),
        }
    }

    /// Serialize to the persisted blob form.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(serde_yaml::to_string(self)?.into_bytes())
    }

    /// Decode a blob, migrating deprecated field spellings. `None` when
    /// the bytes are not a recognizable options document.
    pub fn from_blob(bytes: &[u8]) -> Option<Self> {
        serde_yaml::from_slice::<VersionedOptions>(bytes)
            .ok()
            .map(VersionedOptions::migrate)
    }

    /// Try to decode a bootstrap configuration from a candidate event:
    /// first from its attachments, then from a recognized embed field.
    pub fn from_event(event: &ThreadEvent) -> Option<Self> {
        for attachment in &event.attachments {
            if let Some(options) = Self::from_blob(&attachment.data) {
                return Some(options);
            }
        }
        for embed in &event.embeds {
            if let Some(params) = embed.field(OPTIONS_EMBED_FIELD) {
                if let Some(options) = Self::from_blob(params.as_bytes()) {
                    return Some(options);
                }
            }
        }
        None
    }
}

/// Decode-side view accepting both current and deprecated spellings.
#[derive(Debug, Deserialize)]
struct VersionedOptions {
    request: CompletionRequest,
    #[serde(default)]
    features: VersionedFeatures,
}

#[derive(Debug, Default, Deserialize)]
struct VersionedFeatures {
    response_timing: Option<ResponseTiming>,
    respond_to_bots: Option<bool>,
    /// Deprecated spelling of `response_timing`.
    timing: Option<ResponseTiming>,
    /// Deprecated: "anyone" | "any human" | "initial user".
    reply_to: Option<String>,
}

impl VersionedOptions {
    /// Pure migration to the current shape, applied once at load time.
    fn migrate(self) -> SessionOptions {
        let features = self.features;
        let response_timing = features
            .response_timing
            .or(features.timing)
            .unwrap_or_default();
        let respond_to_bots = features
            .respond_to_bots
            .unwrap_or_else(|| features.reply_to.as_deref() == Some("anyone"));
        SessionOptions {
            request: self.request,
            features: ChatFeatures {
                response_timing,
                respond_to_bots,
            },
        }
    }
}
