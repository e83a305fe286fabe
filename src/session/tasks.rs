//! Deduplicated, supersedable background work.
//!
//! Each key owns at most one in-flight attempt. Starting a new attempt
//! for a key cancels the previous one, and every caller waiting on that
//! key receives the result of whichever attempt actually resolves. A
//! superseded attempt never publishes; whatever partial work it did is
//! discarded wholesale, which is what makes redundant reconstruction
//! kicks safe.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

struct PendingTask<T> {
    cancel: CancellationToken,
    /// Single-resolution slot. `None` until some attempt publishes.
    slot: watch::Sender<Option<T>>,
}

pub struct IdempotentTasks<K, T> {
    /// Tokens are only ever cancelled while this lock is held, which is
    /// what makes publish-or-discard atomic with supersession.
    tasks: Arc<Mutex<HashMap<K, PendingTask<T>>>>,
}

impl<K, T> Default for IdempotentTasks<K, T> {
    fn default() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> IdempotentTasks<K, T>
where
    K: Eq + Hash + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the attempt for `key` and wait for the key to
    /// resolve. The closure receives the attempt's cancellation token;
    /// long-running work should observe it at its suspension points.
    ///
    /// An unresolved slot is reused so earlier waiters rendezvous on
    /// the newest attempt; a resolved slot is replaced, so a rerun
    /// never returns stale output.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let sender = {
            let mut tasks = self.tasks.lock().await;
            let sender = match tasks.remove(&key) {
                Some(pending) if pending.slot.borrow().is_none() => {
                    pending.cancel.cancel();
                    pending.slot
                }
                // resolved (or absent): a rerun gets a fresh slot
                _ => watch::channel(None).0,
            };
            tasks.insert(
                key,
                PendingTask {
                    cancel: cancel.clone(),
                    slot: sender.clone(),
                },
            );
            sender
        };
        let mut receiver = sender.subscribe();

        let attempt = cancel.clone();
        let work = make(attempt.clone());
        let registry = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            let result = work.await;
            // a superseded attempt must not publish; the token flips
            // only under the registry lock
            let _registry = registry.lock().await;
            if !attempt.is_cancelled() {
                sender.send_replace(Some(result));
            }
        });

        let resolved = receiver
            .wait_for(|slot| slot.is_some())
            .await
            .map_err(|_| Error::ReconstructionCancelled)?;
        resolved.as_ref().cloned().ok_or(Error::ReconstructionCancelled)
    }

    /// Cancel and forget the attempt for `key`, if any. Current waiters
    /// observe the cancellation as an error.
    pub async fn cancel(&self, key: &K) {
        if let Some(pending) = self.tasks.lock().await.remove(key) {
            pending.cancel.cancel();
        }
    }
}
