//! Publisher and subscriber loops bridging the hub and the bus.
//!
//! The publisher serializes each locally originated message onto its
//! chat topic. The subscriber decodes everything heard on the bus and
//! re-injects it into the hub's inbound stream, where it is handled
//! exactly like a local message.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;

use super::{BusPayload, MessageBus, topic_for};
use crate::domain::ChatMessage;
use crate::hub::Envelope;

/// Publishes messages from `rx` until the hub drops its sender.
pub(crate) async fn run_publisher(
    bus: Arc<dyn MessageBus>,
    mut rx: mpsc::Receiver<ChatMessage>,
    prefix: String,
    timeout: Duration,
) {
    while let Some(message) = rx.recv().await {
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    error = %e,
                    "failed to encode message for bus"
                );
                continue;
            }
        };
        let topic = topic_for(&prefix, &message.chat_id);
        match tokio::time::timeout(timeout, bus.publish(&topic, payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(%topic, message_id = %message.id, error = %e, "bus publish failed");
            }
            Err(_) => {
                tracing::error!(%topic, message_id = %message.id, "bus publish timed out");
            }
        }
    }
    tracing::debug!("bus publisher stopped");
}

/// Feeds bus payloads into the hub's inbound stream.
///
/// Malformed payloads are logged and skipped. Returns when the
/// subscription ends or the hub is gone.
pub(crate) async fn run_subscriber(
    mut subscription: BoxStream<'static, BusPayload>,
    inbound: mpsc::Sender<Envelope>,
) {
    while let Some(payload) = subscription.next().await {
        let message = match decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    topic = %payload.topic,
                    error = %e,
                    "dropping malformed bus payload"
                );
                continue;
            }
        };
        if inbound.send(Envelope::from_bus(message)).await.is_err() {
            tracing::debug!("hub inbound stream closed, stopping bus subscriber");
            return;
        }
    }
    tracing::error!("bus subscription ended; this process no longer hears its peers");
}

fn decode(payload: &BusPayload) -> Result<ChatMessage, serde_json::Error> {
    serde_json::from_slice(&payload.data)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::bus::MemoryBus;
    use crate::domain::{ChatId, Submission, UserId};
    use crate::hub::Origin;

    fn message(chat: &str) -> ChatMessage {
        let sub = Submission {
            chat_id: ChatId::new(chat),
            body: "hi".to_string(),
        };
        ChatMessage::compose(sub, UserId::new(), "Ada".to_string())
    }

    #[tokio::test]
    async fn subscriber_skips_malformed_payloads() {
        let good = message("room-1");
        let Ok(data) = serde_json::to_vec(&good) else {
            panic!("encode failed");
        };
        let payloads = vec![
            BusPayload {
                topic: "chat:room-1".into(),
                data: b"{not json".to_vec(),
            },
            BusPayload {
                topic: "chat:room-1".into(),
                data,
            },
        ];
        let (tx, mut rx) = mpsc::channel(4);
        run_subscriber(stream::iter(payloads).boxed(), tx).await;

        let Some(envelope) = rx.recv().await else {
            panic!("expected the well-formed payload");
        };
        assert_eq!(envelope.origin, Origin::Bus);
        assert_eq!(envelope.message, good);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn publisher_uses_chat_topic() {
        let bus = MemoryBus::new(8);
        let Ok(mut sub) = bus.subscribe("chat:*").await else {
            panic!("subscribe failed");
        };
        let (tx, rx) = mpsc::channel(4);
        let publisher = tokio::spawn(run_publisher(
            Arc::new(bus.clone()),
            rx,
            "chat:".to_string(),
            Duration::from_secs(1),
        ));

        let sent = message("group-devs");
        let _ = tx.send(sent.clone()).await;
        drop(tx);
        let _ = publisher.await;

        let Some(payload) = sub.next().await else {
            panic!("expected a published payload");
        };
        assert_eq!(payload.topic, "chat:group-devs");
        let Ok(decoded) = decode(&payload) else {
            panic!("payload should decode");
        };
        assert_eq!(decoded, sent);
    }
}
