//! Pub/sub bus connecting relay processes.
//!
//! Every locally originated message is published on a per-chat topic;
//! every process runs one subscriber over the whole topic namespace and
//! feeds what it hears back into its own inbound stream. [`MessageBus`]
//! is the seam: [`RedisBus`] for real deployments, [`MemoryBus`] for a
//! single process and for tests.

pub mod bridge;
pub mod memory;
pub mod redis_pubsub;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::ChatId;
use crate::error::RelayError;

pub use memory::MemoryBus;
pub use redis_pubsub::RedisBus;

/// One payload received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusPayload {
    /// Topic the payload was published on.
    pub topic: String,
    /// Raw payload bytes (a JSON-encoded chat message when well formed).
    pub data: Vec<u8>,
}

/// Publish/subscribe transport shared by all relay processes.
#[async_trait]
pub trait MessageBus: std::fmt::Debug + Send + Sync {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bus`] if the bus rejects the publish.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), RelayError>;

    /// Opens a long-lived subscription to every topic matching `pattern`.
    ///
    /// Patterns are exact topic names or a prefix followed by `*`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bus`] if the subscription cannot be
    /// established.
    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<'static, BusPayload>, RelayError>;
}

/// Topic name for a chat room.
#[must_use]
pub fn topic_for(prefix: &str, chat_id: &ChatId) -> String {
    format!("{prefix}{chat_id}")
}

/// Pattern covering every chat topic under `prefix`.
#[must_use]
pub fn all_topics(prefix: &str) -> String {
    format!("{prefix}*")
}

/// Returns `true` if `topic` matches `pattern` (exact or trailing `*`).
#[must_use]
pub fn pattern_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}
