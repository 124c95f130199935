//! Redis pub/sub implementation of [`MessageBus`].
//!
//! Publishing goes through one multiplexed connection shared by all
//! callers. Each subscription opens its own dedicated pub/sub connection
//! and uses `PSUBSCRIBE`, so one subscription covers every chat topic.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::{BusPayload, MessageBus};
use crate::error::RelayError;

/// Redis-backed bus.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

impl fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBus")
            .field("server", &self.client.get_connection_info().addr)
            .finish_non_exhaustive()
    }
}

impl RedisBus {
    /// Connects to Redis and verifies the server answers `PING` within
    /// `timeout`.
    ///
    /// A relay must not serve traffic without its bus, so callers treat
    /// an error here as fatal.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bus`] if the URL is invalid, the server is
    /// unreachable, or the handshake does not finish in time.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = redis::Client::open(url)?;

        let handshake = async {
            let mut publisher = client.get_multiplexed_async_connection().await?;
            let pong: String = redis::cmd("PING").query_async(&mut publisher).await?;
            Ok::<_, RelayError>((publisher, pong))
        };
        let (publisher, pong) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| RelayError::Bus(format!("no answer from redis within {timeout:?}")))??;

        tracing::info!(reply = %pong, "connected to redis bus");
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), RelayError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(topic, payload).await?;
        tracing::trace!(topic, receivers, "published to redis");
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<'static, BusPayload>, RelayError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(pattern).await?;
        tracing::info!(pattern, "subscribed to redis topics");

        let stream = pubsub.into_on_message().map(|msg| BusPayload {
            topic: msg.get_channel_name().to_string(),
            data: msg.get_payload_bytes().to_vec(),
        });
        Ok(stream.boxed())
    }
}
