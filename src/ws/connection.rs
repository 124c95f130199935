//! One client session and its two pumps.
//!
//! A [`Connection`] is scoped to a single chat for its lifetime. The read
//! pump turns client frames into [`ChatMessage`]s and submits them to the
//! hub; the write pump drains the outbound queue to the socket. The pumps
//! never wait on each other: when the read pump ends it unregisters the
//! connection, which closes the outbound queue, which ends the write pump,
//! which closes the socket.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::domain::{
    ChatId, ChatMessage, ConnectionId, FrameRejection, InboundFrame, UserId, VerifiedIdentity,
};
use crate::hub::{Hub, Registration};

/// Identity of one live client session.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    chat_id: ChatId,
}

impl Connection {
    /// Creates a session for `identity` in `chat_id`, returning its
    /// registry entry and the receiving half of its outbound queue.
    #[must_use]
    pub fn open(
        identity: &VerifiedIdentity,
        chat_id: ChatId,
        outbound_capacity: usize,
    ) -> (Self, Registration, mpsc::Receiver<ChatMessage>) {
        let (tx, rx) = mpsc::channel(outbound_capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            user_id: identity.user_id,
            chat_id,
        };
        let registration = Registration::new(conn.id, conn.user_id, conn.chat_id.clone(), tx);
        (conn, registration, rx)
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Authenticated user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Room this session is scoped to.
    #[must_use]
    pub const fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }
}

/// Reads client frames until the peer closes or the transport fails,
/// then unregisters the connection exactly once.
pub async fn read_pump<S, E>(conn: Connection, hub: Hub, mut stream: S)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => accept(&conn, &hub, text.as_str()).await,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!(conn_id = %conn.id, "ignoring binary frame");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(conn_id = %conn.id, error = %e, "websocket read error");
                break;
            }
        }
    }
    hub.unregister(conn.id).await;
    tracing::debug!(conn_id = %conn.id, "read pump finished");
}

/// Handles one text frame. Protocol faults are logged and skipped.
async fn accept(conn: &Connection, hub: &Hub, text: &str) {
    let submission = match InboundFrame::parse(text) {
        Ok(submission) => submission,
        Err(FrameRejection::Malformed) => {
            tracing::warn!(conn_id = %conn.id, "discarding malformed frame");
            return;
        }
        Err(rejection) => {
            tracing::debug!(conn_id = %conn.id, %rejection, "discarding empty frame");
            return;
        }
    };
    // Admission was checked for the connection's room only.
    if submission.chat_id != conn.chat_id {
        tracing::warn!(
            conn_id = %conn.id,
            user_id = %conn.user_id,
            room = %conn.chat_id,
            target = %submission.chat_id,
            "discarding frame addressed outside the connection's room"
        );
        return;
    }

    let name = hub.display_name(conn.user_id).await;
    let message = ChatMessage::compose(submission, conn.user_id, name);
    let message_id = message.id;
    tracing::debug!(
        conn_id = %conn.id,
        %message_id,
        chat_id = %message.chat_id,
        "message accepted"
    );

    let _ = hub.persist(message.clone());
    if let Err(e) = hub.submit(message).await {
        tracing::warn!(conn_id = %conn.id, %message_id, error = %e, "message not dispatched");
    }
}

/// Writes queued messages in order until the queue closes or a write
/// fails, then closes the socket.
pub async fn write_pump<K>(
    conn_id: ConnectionId,
    mut outbound: mpsc::Receiver<ChatMessage>,
    mut sink: K,
) where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    while let Some(message) = outbound.recv().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(
                    %conn_id,
                    message_id = %message.id,
                    error = %e,
                    "failed to encode message"
                );
                continue;
            }
        };
        if let Err(e) = sink.send(Message::text(json)).await {
            tracing::debug!(%conn_id, error = %e, "websocket write error");
            break;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    tracing::debug!(%conn_id, "write pump finished");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::channel::mpsc as fmpsc;
    use futures_util::stream;

    use super::*;
    use crate::bus::MemoryBus;
    use crate::domain::Submission;
    use crate::hub::{HubConfig, UNKNOWN_USER};
    use crate::persistence::{ChatStore, MemoryStore};

    async fn start_hub(store: Arc<MemoryStore>) -> Hub {
        let Ok(hub) = Hub::start(
            HubConfig::default(),
            store as Arc<dyn ChatStore>,
            Arc::new(MemoryBus::new(64)),
        )
        .await
        else {
            panic!("hub should start");
        };
        hub
    }

    async fn register(
        hub: &Hub,
        identity: &VerifiedIdentity,
        chat: &str,
    ) -> (Connection, mpsc::Receiver<ChatMessage>) {
        let (conn, registration, rx) = Connection::open(identity, ChatId::new(chat), 16);
        let Ok(()) = hub.register(registration).await else {
            panic!("register failed");
        };
        for _ in 0..100 {
            if hub.is_registered(conn.id()).await {
                return (conn, rx);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("connection never registered");
    }

    fn text(json: &str) -> Result<Message, Infallible> {
        Ok(Message::text(json.to_string()))
    }

    #[tokio::test]
    async fn read_pump_relays_valid_frames_and_skips_bad_ones() {
        let store = Arc::new(MemoryStore::new());
        let sender = VerifiedIdentity::new(UserId::new());
        store.set_display_name(sender.user_id, "Ada Lovelace");
        let hub = start_hub(Arc::clone(&store)).await;

        let (_, mut listener) =
            register(&hub, &VerifiedIdentity::new(UserId::new()), "room-42").await;
        let (author, _author_rx) = register(&hub, &sender, "room-42").await;
        let author_id = author.id();

        let frames = vec![
            text(r#"{"chat_id":"","text":"hi"}"#),
            text(r#"{"chat_id":"room-42","text":""}"#),
            text("not json"),
            text(r#"{"chat_id":"room-42","text":"hi"}"#),
        ];
        read_pump(author, hub.clone(), stream::iter(frames)).await;

        let Ok(Some(received)) = tokio::time::timeout(Duration::from_secs(1), listener.recv()).await
        else {
            panic!("listener should receive the message");
        };
        assert_eq!(received.body, "hi");
        assert_eq!(received.sender_id, sender.user_id);
        assert_eq!(received.sender_display_name, "Ada Lovelace");
        assert!(!received.read);
        assert!(
            tokio::time::timeout(Duration::from_millis(200), listener.recv())
                .await
                .is_err()
        );

        for _ in 0..100 {
            if store.save_calls() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.save_calls(), 1);

        for _ in 0..100 {
            if !hub.is_registered(author_id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("read pump should unregister on end of stream");
    }

    #[tokio::test]
    async fn read_pump_uses_placeholder_when_lookup_fails() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_lookups(true);
        let hub = start_hub(Arc::clone(&store)).await;
        let (_, mut listener) =
            register(&hub, &VerifiedIdentity::new(UserId::new()), "room-1").await;
        let (author, _rx) = register(&hub, &VerifiedIdentity::new(UserId::new()), "room-1").await;

        let frames = vec![text(r#"{"chat_id":"room-1","text":"yo"}"#)];
        read_pump(author, hub.clone(), stream::iter(frames)).await;

        let Ok(Some(received)) = tokio::time::timeout(Duration::from_secs(1), listener.recv()).await
        else {
            panic!("listener should receive the message");
        };
        assert_eq!(received.sender_display_name, UNKNOWN_USER);
    }

    #[tokio::test]
    async fn read_pump_drops_frames_for_other_rooms() {
        let store = Arc::new(MemoryStore::new());
        let hub = start_hub(Arc::clone(&store)).await;
        let (_, mut other_room) =
            register(&hub, &VerifiedIdentity::new(UserId::new()), "room-2").await;
        let (_, mut watcher) =
            register(&hub, &VerifiedIdentity::new(UserId::new()), "global").await;
        let (author, _rx) = register(&hub, &VerifiedIdentity::new(UserId::new()), "room-1").await;

        let frames = vec![
            text(r#"{"chat_id":"room-2","text":"sneaky"}"#),
            text(r#"{"chat_id":"global","text":"to everyone"}"#),
        ];
        read_pump(author, hub.clone(), stream::iter(frames)).await;

        let quiet = Duration::from_millis(200);
        assert!(tokio::time::timeout(quiet, other_room.recv()).await.is_err());
        assert!(tokio::time::timeout(quiet, watcher.recv()).await.is_err());
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn read_pump_stops_on_transport_error() {
        let store = Arc::new(MemoryStore::new());
        let hub = start_hub(Arc::clone(&store)).await;
        let (author, _rx) = register(&hub, &VerifiedIdentity::new(UserId::new()), "room-1").await;
        let id = author.id();

        let frames: Vec<Result<Message, &str>> = vec![
            Err("connection reset"),
            Ok(Message::text(r#"{"chat_id":"room-1","text":"never read"}"#.to_string())),
        ];
        read_pump(author, hub.clone(), stream::iter(frames)).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!hub.is_registered(id).await);
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn write_pump_preserves_order_and_closes() {
        let (tx, rx) = mpsc::channel(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();

        let messages: Vec<ChatMessage> = ["one", "two", "three"]
            .into_iter()
            .map(|body| {
                let sub = Submission {
                    chat_id: ChatId::new("room-1"),
                    body: body.to_string(),
                };
                ChatMessage::compose(sub, UserId::new(), "Ada".to_string())
            })
            .collect();
        for m in &messages {
            let _ = tx.send(m.clone()).await;
        }
        drop(tx);

        write_pump(ConnectionId::new(), rx, sink).await;

        let mut bodies = Vec::new();
        let mut closed = false;
        while let Some(frame) = written.next().await {
            match frame {
                Message::Text(text) => {
                    let Ok(m) = serde_json::from_str::<ChatMessage>(text.as_str()) else {
                        panic!("frame should be a chat message");
                    };
                    bodies.push(m.body);
                }
                Message::Close(_) => closed = true,
                _ => panic!("unexpected frame"),
            }
        }
        assert_eq!(bodies, vec!["one", "two", "three"]);
        assert!(closed);
    }

    #[tokio::test]
    async fn write_pump_stops_when_transport_fails() {
        let (tx, rx) = mpsc::channel(8);
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);

        let sub = Submission {
            chat_id: ChatId::new("room-1"),
            body: "lost".to_string(),
        };
        let _ = tx.send(ChatMessage::compose(sub, UserId::new(), "Ada".to_string())).await;

        // Returns even though the sender half is still open.
        let finished =
            tokio::time::timeout(Duration::from_secs(1), write_pump(ConnectionId::new(), rx, sink))
                .await;
        assert!(finished.is_ok());
        drop(tx);
    }
}
