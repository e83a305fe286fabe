//! The conversation-wide session registry.
//!
//! One controller owns every live session, keyed by thread id. Sessions
//! are rebuilt on demand from the thread's own transcript and cached;
//! threads that turn out not to be managed conversations are cached as
//! invalid so repeated lookups stay cheap. Reconstruction runs through
//! [`IdempotentTasks`], so concurrent or redundant rebuild kicks for
//! the same thread collapse into a single published session.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::session::history;
use crate::session::session::ChatSession;
use crate::session::tasks::IdempotentTasks;
use crate::transcript::TranscriptSource;

/// What one reconstruction attempt publishes to every waiter.
type Reconstruction = std::result::Result<Option<Arc<ChatSession>>, Arc<Error>>;

#[derive(Default)]
pub struct SessionController {
    sessions: Mutex<HashMap<u64, Arc<ChatSession>>>,
    /// Threads known to carry no bootstrap event.
    invalid: Mutex<HashSet<u64>>,
    pending: IdempotentTasks<u64, Reconstruction>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached session for a thread, if any.
    pub async fn get(&self, thread_id: u64) -> Option<Arc<ChatSession>> {
        self.sessions.lock().await.get(&thread_id).cloned()
    }

    /// Register a freshly created session, such as one bootstrapped by
    /// a command in a brand-new thread.
    pub async fn insert(&self, thread_id: u64, session: ChatSession) -> Arc<ChatSession> {
        let session = Arc::new(session);
        self.invalid.lock().await.remove(&thread_id);
        self.sessions
            .lock()
            .await
            .insert(thread_id, session.clone());
        session
    }

    /// Return the session for `thread_id`, rebuilding it from `source`
    /// when absent. With `refresh` the cache is bypassed and the thread
    /// is re-read from scratch; a still-running rebuild for the same
    /// thread is superseded and all waiters receive the new result.
    pub async fn ensure<S>(&self, thread_id: u64, source: S, refresh: bool) -> Result<Arc<ChatSession>>
    where
        S: TranscriptSource + 'static,
    {
        if !refresh {
            if let Some(existing) = self.get(thread_id).await {
                return Ok(existing);
            }
            if self.invalid.lock().await.contains(&thread_id) {
                return Err(Error::InvalidThread(thread_id));
            }
        }

        tracing::debug!(thread = thread_id, refresh, "reconstructing session");
        let outcome = self
            .pending
            .run(thread_id, move |cancel| async move {
                let mut source = source;
                match history::from_transcript(&mut source, &cancel).await {
                    Ok(session) => Ok(session.map(Arc::new)),
                    Err(err) => Err(Arc::new(err)),
                }
            })
            .await?;

        match outcome {
            Ok(Some(session)) => {
                self.invalid.lock().await.remove(&thread_id);
                self.sessions
                    .lock()
                    .await
                    .insert(thread_id, session.clone());
                Ok(session)
            }
            Ok(None) => {
                self.sessions.lock().await.remove(&thread_id);
                self.invalid.lock().await.insert(thread_id);
                Err(Error::InvalidThread(thread_id))
            }
            Err(err) => {
                tracing::error!(thread = thread_id, error = %err, "reconstruction failed");
                Err(Error::Shared(err))
            }
        }
    }

    /// Forget a thread entirely: evict its session, clear any invalid
    /// mark, and cancel an in-flight rebuild.
    pub async fn delete(&self, thread_id: u64) {
        self.sessions.lock().await.remove(&thread_id);
        self.invalid.lock().await.remove(&thread_id);
        self.pending.cancel(&thread_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::CompletionRequest;
    use crate::session::options::SessionOptions;
    use crate::transcript::{EventAttachment, EventAuthor, ThreadEvent};
    use async_trait::async_trait;
    use std::time::Duration;

    struct VecSource(std::vec::IntoIter<ThreadEvent>);

    #[async_trait]
    impl TranscriptSource for VecSource {
        async fn next_event(&mut self) -> Result<Option<ThreadEvent>> {
            Ok(self.0.next())
        }
    }

    /// Stalls before its first event, so a competing rebuild can
    /// supersede it deterministically.
    struct SlowSource {
        events: std::vec::IntoIter<ThreadEvent>,
        delay: Duration,
        slept: bool,
    }

    #[async_trait]
    impl TranscriptSource for SlowSource {
        async fn next_event(&mut self) -> Result<Option<ThreadEvent>> {
            if !self.slept {
                tokio::time::sleep(self.delay).await;
                self.slept = true;
            }
            Ok(self.events.next())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TranscriptSource for FailingSource {
        async fn next_event(&mut self) -> Result<Option<ThreadEvent>> {
            Err(Error::Transcript("history fetch failed".into()))
        }
    }

    fn bootstrap_event(id: u64) -> ThreadEvent {
        let request = CompletionRequest::new("gpt-4", "<@1>");
        let blob = SessionOptions::new(request).to_blob().unwrap();
        let mut event = ThreadEvent::message(id, EventAuthor::bot(2, "helper"), "");
        event
            .attachments
            .push(EventAttachment::new("session.yaml", blob));
        event
    }

    fn thread_events() -> Vec<ThreadEvent> {
        vec![
            bootstrap_event(1),
            ThreadEvent::message(2, EventAuthor::new(1, "alice"), "hello"),
        ]
    }

    #[tokio::test]
    async fn ensure_rebuilds_then_caches() {
        let controller = SessionController::new();

        let first = controller
            .ensure(42, VecSource(thread_events().into_iter()), false)
            .await
            .unwrap();
        assert_eq!(first.message_count().await, 1);

        // cached: the empty source is never read
        let second = controller
            .ensure(42, VecSource(Vec::new().into_iter()), false)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn foreign_threads_are_cached_as_invalid() {
        let controller = SessionController::new();
        let foreign = vec![ThreadEvent::message(1, EventAuthor::new(1, "alice"), "hi")];

        let err = controller
            .ensure(42, VecSource(foreign.into_iter()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidThread(42)));

        // the verdict is cached; a failing source proves no rescan happens
        let err = controller.ensure(42, FailingSource, false).await.unwrap_err();
        assert!(matches!(err, Error::InvalidThread(42)));
    }

    #[tokio::test]
    async fn refresh_clears_an_invalid_mark() {
        let controller = SessionController::new();
        let foreign = vec![ThreadEvent::message(1, EventAuthor::new(1, "alice"), "hi")];
        controller
            .ensure(42, VecSource(foreign.into_iter()), false)
            .await
            .unwrap_err();

        // the thread gained a bootstrap since; refresh picks it up
        let session = controller
            .ensure(42, VecSource(thread_events().into_iter()), true)
            .await
            .unwrap();
        assert_eq!(session.message_count().await, 1);
        assert!(controller.get(42).await.is_some());
    }

    #[tokio::test]
    async fn overlapping_refreshes_converge_on_one_session() {
        let controller = Arc::new(SessionController::new());

        let slow = controller.clone();
        let first = tokio::spawn(async move {
            slow.ensure(
                42,
                SlowSource {
                    events: thread_events().into_iter(),
                    delay: Duration::from_millis(50),
                    slept: false,
                },
                true,
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = controller
            .ensure(42, VecSource(thread_events().into_iter()), true)
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn transcript_failures_are_not_cached_as_invalid() {
        let controller = SessionController::new();

        let err = controller.ensure(42, FailingSource, false).await.unwrap_err();
        assert!(matches!(err, Error::Shared(_)));

        // a transient failure must not poison the thread
        let session = controller
            .ensure(42, VecSource(thread_events().into_iter()), false)
            .await
            .unwrap();
        assert_eq!(session.message_count().await, 1);
    }

    #[tokio::test]
    async fn delete_forgets_the_thread() {
        let controller = SessionController::new();
        controller
            .ensure(42, VecSource(thread_events().into_iter()), false)
            .await
            .unwrap();

        controller.delete(42).await;
        assert!(controller.get(42).await.is_none());
    }

    #[tokio::test]
    async fn insert_registers_a_fresh_session() {
        let controller = SessionController::new();
        let request = CompletionRequest::new("gpt-4", "<@1>");
        let session = ChatSession::new("<@2>", SessionOptions::new(request));

        let registered = controller.insert(42, session).await;
        let cached = controller.get(42).await.unwrap();
        assert!(Arc::ptr_eq(&registered, &cached));
    }
}
