//! In-process bus for single-node deployments and tests.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;

use super::{BusPayload, MessageBus, pattern_matches};
use crate::error::RelayError;

/// In-memory bus backed by one [`broadcast`] channel.
///
/// All relay hubs built over clones of the same `MemoryBus` behave like
/// processes sharing one Redis server.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<BusPayload>,
}

impl MemoryBus {
    /// Creates a bus whose subscribers may lag by up to `capacity` payloads.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), RelayError> {
        // No subscribers is not an error: the payload simply has no audience.
        let _ = self.sender.send(BusPayload {
            topic: topic.to_string(),
            data: payload,
        });
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<'static, BusPayload>, RelayError> {
        let rx = self.sender.subscribe();
        let pattern = pattern.to_string();
        let stream = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "memory bus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |payload| std::future::ready(pattern_matches(&pattern, &payload.topic)));
        Ok(stream.boxed())
    }
}
