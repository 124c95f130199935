//! PostgreSQL implementation of [`ChatStore`].

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{MessageRow, UserNameRow};
use super::{ChatStore, compose_display_name};
use crate::config::RelayConfig;
use crate::domain::{ChatId, ChatMessage, UserId};
use crate::error::RelayError;

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool using the database settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] if the database is unreachable.
    pub async fn connect(config: &RelayConfig) -> Result<Self, RelayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] if a migration fails.
    pub async fn run_migrations(&self) -> Result<(), RelayError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))
    }
}

#[async_trait]
impl ChatStore for PostgresStore {
    async fn save_message(&self, message: &ChatMessage) -> Result<(), RelayError> {
        sqlx::query(
            "INSERT INTO messages (id, chat_id, chat_kind, sender_id, sender_name, content, created_at, is_read) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(*message.id.as_uuid())
        .bind(message.chat_id.as_str())
        .bind(message.chat_kind.as_str())
        .bind(*message.sender_id.as_uuid())
        .bind(&message.sender_display_name)
        .bind(&message.body)
        .bind(message.created_at)
        .bind(message.read)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_recent_messages(
        &self,
        chat_id: &ChatId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RelayError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, sender_id, sender_name, content, created_at, is_read FROM ( \
                 SELECT id, chat_id, sender_id, sender_name, content, created_at, is_read \
                 FROM messages WHERE chat_id = $1 \
                 ORDER BY created_at DESC LIMIT $2 \
             ) recent ORDER BY created_at ASC",
        )
        .bind(chat_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn lookup_display_name(&self, user_id: UserId) -> Result<Option<String>, RelayError> {
        let row = sqlx::query_as::<_, UserNameRow>(
            "SELECT COALESCE(name, '') AS name, COALESCE(surname, '') AS surname \
             FROM users WHERE id = $1",
        )
        .bind(*user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| compose_display_name(&r.name, &r.surname)))
    }

    async fn user_may_access_chat(
        &self,
        user_id: UserId,
        chat_id: &ChatId,
    ) -> Result<bool, RelayError> {
        if chat_id.is_global() {
            return Ok(true);
        }
        let allowed = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM chats WHERE id = $1 AND participants ? $2)",
        )
        .bind(chat_id.as_str())
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(allowed)
    }
}
