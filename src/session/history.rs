//! Session reconstruction from a thread's transcript.
//!
//! A thread is self-describing: its oldest messages contain a bootstrap
//! event carrying the session's serialized options, and every message
//! after it is conversation. Rebuilding therefore needs no database,
//! only a transcript scan, and the scan replays each event through the
//! same splice path used for live edits.

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::session::options::SessionOptions;
use crate::session::session::ChatSession;
use crate::transcript::{ThreadEvent, TranscriptSource};

/// Walk the transcript oldest-first and rebuild the session it
/// describes. Returns `None` when no bootstrap event exists, which
/// marks the thread as not ours. Cancellation is observed between
/// events, leaving no session behind.
pub async fn from_transcript<S: TranscriptSource>(
    source: &mut S,
    cancel: &CancellationToken,
) -> Result<Option<ChatSession>> {
    let mut session: Option<ChatSession> = None;
    let mut replayed = 0usize;

    while let Some(event) = source.next_event().await? {
        if cancel.is_cancelled() {
            return Err(Error::ReconstructionCancelled);
        }
        match &session {
            None => {
                if let Some(found) = bootstrap(&event) {
                    session = Some(found);
                }
            }
            Some(existing) => {
                existing.splice(event.id, Some(&event)).await;
                replayed += 1;
            }
        }
    }

    match session {
        Some(session) => {
            let messages = session.message_count().await;
            tracing::info!(replayed, messages, "reconstructed session from transcript");
            Ok(Some(session))
        }
        None => {
            tracing::debug!("transcript has no bootstrap event");
            Ok(None)
        }
    }
}

/// A bootstrap event is one posted by the assistant itself whose
/// payload decodes into session options. The poster's mention becomes
/// the session's assistant identity.
fn bootstrap(event: &ThreadEvent) -> Option<ChatSession> {
    let author = event.author.as_ref()?;
    let options = SessionOptions::from_event(event)?;
    tracing::debug!(event = event.id, assistant = %author.mention(), "found bootstrap event");
    Some(ChatSession::new(author.mention(), options))
}
