//! Outbound transport units and the emission seam.

use async_trait::async_trait;

use crate::error::Result;

/// One unit of outbound transport. Units are atomic: the sink must
/// never split one further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportUnit {
    /// Plain message content, guaranteed to fit the transport ceiling.
    Content(String),
    /// An engine-generated status report (failure notices). The host
    /// must mark these with [`crate::transcript::SYSTEM_FOOTER`] so the
    /// platform's echo is recognized and dropped on replay.
    Notice(String),
    /// A file attachment, used for payloads too large to inline.
    Attachment { name: String, data: Vec<u8> },
}

impl TransportUnit {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content(text.into())
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::Notice(text.into())
    }

    pub fn attachment(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Attachment {
            name: name.into(),
            data,
        }
    }

    /// The inline text of a content unit.
    pub fn as_content(&self) -> Option<&str> {
        match self {
            Self::Content(text) => Some(text),
            Self::Notice(_) | Self::Attachment { .. } => None,
        }
    }

    /// The text of a status-report unit.
    pub fn as_notice(&self) -> Option<&str> {
        match self {
            Self::Notice(text) => Some(text),
            Self::Content(_) | Self::Attachment { .. } => None,
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, Self::Attachment { .. })
    }
}

/// Delivery seam for reply units, implemented by the host adapter.
/// Units are sent in order; ordering is the conversation's ordering.
#[async_trait]
pub trait EmissionSink: Send + Sync {
    async fn emit(&self, unit: TransportUnit) -> Result<()>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use testing::RecordingSink;

    #[test]
    fn sink_receives_units_in_order() {
        let sink = RecordingSink::default();
        tokio_test::block_on(async {
            sink.emit(TransportUnit::content("first")).await.unwrap();
            sink.emit(TransportUnit::content("second")).await.unwrap();
        });
        let units = sink.units.lock().unwrap();
        assert_eq!(units[0].as_content(), Some("first"));
        assert_eq!(units[1].as_content(), Some("second"));
    }

    #[test]
    fn content_accessor() {
        let unit = TransportUnit::content("hello");
        assert_eq!(unit.as_content(), Some("hello"));
        assert!(!unit.is_attachment());
    }

    #[test]
    fn notice_accessor() {
        let unit = TransportUnit::notice("Completion request failed");
        assert_eq!(unit.as_notice(), Some("Completion request failed"));
        assert_eq!(unit.as_content(), None);
        assert!(!unit.is_attachment());
    }

    #[test]
    fn attachment_accessor() {
        let unit = TransportUnit::attachment("code.rs", b"fn main() {}".to_vec());
        assert_eq!(unit.as_content(), None);
        assert!(unit.is_attachment());
    }
}
