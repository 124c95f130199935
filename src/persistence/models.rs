//! Database row types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{ChatId, ChatMessage, MessageId, UserId};

/// A row from the `messages` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    /// Message id.
    pub id: Uuid,
    /// Room id.
    pub chat_id: String,
    /// Author id.
    pub sender_id: Uuid,
    /// Author display name at send time.
    pub sender_name: String,
    /// Message text.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Read flag.
    pub is_read: bool,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        let chat_id = ChatId::new(row.chat_id);
        Self {
            id: MessageId::from_uuid(row.id),
            chat_kind: chat_id.kind(),
            chat_id,
            sender_id: UserId::from_uuid(row.sender_id),
            sender_display_name: row.sender_name,
            body: row.content,
            created_at: row.created_at,
            read: row.is_read,
        }
    }
}

/// Name columns from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserNameRow {
    /// First name, empty when unset.
    pub name: String,
    /// Last name, empty when unset.
    pub surname: String,
}
