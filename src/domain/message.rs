//! Chat messages and the client frame they are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChatId, ChatKind, MessageId, UserId};

/// A chat message as delivered to clients, published on the bus and
/// persisted by the store.
///
/// Immutable once constructed. Wire shape:
/// ```json
/// {
///   "id": "5f0c…",
///   "chat_id": "room-42",
///   "chat_kind": "direct",
///   "sender_id": "9a1e…",
///   "sender_display_name": "Ada Lovelace",
///   "content": "hi",
///   "created_at": "2026-10-19T12:00:00Z",
///   "read": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Globally unique id, assigned by the origin process.
    pub id: MessageId,
    /// Room the message was posted to.
    pub chat_id: ChatId,
    /// Derived from `chat_id` at construction time.
    pub chat_kind: ChatKind,
    /// Author.
    pub sender_id: UserId,
    /// Author's display name at send time.
    pub sender_display_name: String,
    /// Message text, never empty.
    #[serde(rename = "content")]
    pub body: String,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Read flag; always `false` for freshly relayed messages.
    pub read: bool,
}

impl ChatMessage {
    /// Builds a new message from an accepted client submission, assigning
    /// a fresh id and timestamp.
    #[must_use]
    pub fn compose(submission: Submission, sender_id: UserId, sender_display_name: String) -> Self {
        let chat_kind = submission.chat_id.kind();
        Self {
            id: MessageId::new(),
            chat_id: submission.chat_id,
            chat_kind,
            sender_id,
            sender_display_name,
            body: submission.body,
            created_at: Utc::now(),
            read: false,
        }
    }
}

/// Client-submitted frame: `{ "chat_id": "...", "text": "..." }`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    /// Target room.
    #[serde(default)]
    pub chat_id: String,
    /// Message body.
    #[serde(default)]
    pub text: String,
}

/// Reason an inbound frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameRejection {
    /// The frame was not valid JSON of the expected shape.
    #[error("malformed frame")]
    Malformed,
    /// `chat_id` was empty.
    #[error("empty chat id")]
    EmptyChatId,
    /// `text` was empty.
    #[error("empty message body")]
    EmptyBody,
}

/// A validated submission: non-empty room id and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Target room.
    pub chat_id: ChatId,
    /// Message body.
    pub body: String,
}

impl InboundFrame {
    /// Decodes and validates a text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameRejection`] if the payload is not a frame or if
    /// either field is empty.
    pub fn parse(text: &str) -> Result<Submission, FrameRejection> {
        let frame: Self = serde_json::from_str(text).map_err(|_| FrameRejection::Malformed)?;
        frame.validate()
    }

    /// Validates an already-decoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameRejection::EmptyChatId`] or
    /// [`FrameRejection::EmptyBody`] for empty fields.
    pub fn validate(self) -> Result<Submission, FrameRejection> {
        if self.chat_id.is_empty() {
            return Err(FrameRejection::EmptyChatId);
        }
        if self.text.is_empty() {
            return Err(FrameRejection::EmptyBody);
        }
        Ok(Submission {
            chat_id: ChatId::new(self.chat_id),
            body: self.text,
        })
    }
}
