//! Bounded persistence queue with a dedicated consumer task.
//!
//! Live delivery never waits on storage: the read pump hands each message
//! to [`PersistenceWriter::enqueue`], which never blocks. A single task
//! drains the queue into the [`ChatStore`]. The backlog is observable and
//! capped; when the store falls behind far enough to fill the queue, new
//! messages are delivered but not persisted.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::ChatStore;
use crate::domain::ChatMessage;

/// Handle to the persistence queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PersistenceWriter {
    tx: mpsc::Sender<ChatMessage>,
    capacity: usize,
}

impl PersistenceWriter {
    /// Spawns the consumer task and returns a handle to its queue.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<dyn ChatStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(drain(store, rx));
        Self { tx, capacity }
    }

    /// Queues a message for saving. Returns `false` if it was dropped
    /// because the queue is full or the consumer is gone.
    pub fn enqueue(&self, message: ChatMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(
                    message_id = %message.id,
                    chat_id = %message.chat_id,
                    backlog = self.capacity,
                    "persistence queue full, message not persisted"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                tracing::error!(message_id = %message.id, "persistence consumer stopped");
                false
            }
        }
    }

    /// Number of messages waiting to be saved.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }
}

async fn drain(store: Arc<dyn ChatStore>, mut rx: mpsc::Receiver<ChatMessage>) {
    while let Some(message) = rx.recv().await {
        match store.save_message(&message).await {
            Ok(()) => {
                tracing::debug!(
                    message_id = %message.id,
                    chat_id = %message.chat_id,
                    "message persisted"
                );
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    chat_id = %message.chat_id,
                    error = %e,
                    "failed to persist message"
                );
            }
        }
    }
    tracing::debug!("persistence queue closed");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::domain::{ChatId, Submission, UserId};
    use crate::error::RelayError;
    use crate::persistence::MemoryStore;

    fn message(body: &str) -> ChatMessage {
        let sub = Submission {
            chat_id: ChatId::new("room-1"),
            body: body.to_string(),
        };
        ChatMessage::compose(sub, UserId::new(), "Ada".to_string())
    }

    /// Store whose saves wait for a permit.
    #[derive(Debug)]
    struct GatedStore {
        gate: Semaphore,
        inner: MemoryStore,
    }

    #[async_trait]
    impl ChatStore for GatedStore {
        async fn save_message(&self, message: &ChatMessage) -> Result<(), RelayError> {
            let Ok(permit) = self.gate.acquire().await else {
                return Err(RelayError::Internal("gate closed".into()));
            };
            permit.forget();
            self.inner.save_message(message).await
        }

        async fn fetch_recent_messages(
            &self,
            chat_id: &ChatId,
            limit: usize,
        ) -> Result<Vec<ChatMessage>, RelayError> {
            self.inner.fetch_recent_messages(chat_id, limit).await
        }

        async fn lookup_display_name(&self, user_id: UserId) -> Result<Option<String>, RelayError> {
            self.inner.lookup_display_name(user_id).await
        }

        async fn user_may_access_chat(
            &self,
            user_id: UserId,
            chat_id: &ChatId,
        ) -> Result<bool, RelayError> {
            self.inner.user_may_access_chat(user_id, chat_id).await
        }
    }

    async fn wait_for_saves(store: &MemoryStore, expected: usize) {
        for _ in 0..100 {
            if store.save_calls() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {expected} saves, saw {}", store.save_calls());
    }

    #[tokio::test]
    async fn queued_messages_reach_the_store() {
        let store = Arc::new(MemoryStore::new());
        let writer = PersistenceWriter::spawn(Arc::clone(&store) as Arc<dyn ChatStore>, 8);

        assert!(writer.enqueue(message("one")));
        assert!(writer.enqueue(message("two")));
        wait_for_saves(&store, 2).await;

        let bodies: Vec<String> = store.messages().await.into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn store_failures_do_not_stop_the_consumer() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_saves(true);
        let writer = PersistenceWriter::spawn(Arc::clone(&store) as Arc<dyn ChatStore>, 8);

        assert!(writer.enqueue(message("lost")));
        wait_for_saves(&store, 1).await;

        store.set_fail_saves(false);
        assert!(writer.enqueue(message("kept")));
        wait_for_saves(&store, 2).await;
        assert_eq!(store.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let store = Arc::new(GatedStore {
            gate: Semaphore::new(0),
            inner: MemoryStore::new(),
        });
        let writer = PersistenceWriter::spawn(Arc::clone(&store) as Arc<dyn ChatStore>, 2);

        // The consumer takes the first message and parks on the gate.
        assert!(writer.enqueue(message("in flight")));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(writer.enqueue(message("queued 1")));
        assert!(writer.enqueue(message("queued 2")));
        assert_eq!(writer.backlog(), 2);
        assert!(!writer.enqueue(message("dropped")));

        store.gate.add_permits(3);
        wait_for_saves(&store.inner, 3).await;
        assert_eq!(store.inner.messages().await.len(), 3);
    }
}
