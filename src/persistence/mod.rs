//! Persistence layer: the storage collaborator boundary.
//!
//! The relay never talks to a database directly. It calls the four
//! operations of [`ChatStore`]; the PostgreSQL implementation backs
//! production and [`MemoryStore`] backs single-node runs and tests.
//! Message writes go through [`PersistenceWriter`] so that a slow store
//! can never hold up live delivery.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod writer;

use async_trait::async_trait;

use crate::domain::{ChatId, ChatMessage, UserId};
use crate::error::RelayError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use writer::PersistenceWriter;

/// Operations the relay needs from durable storage.
#[async_trait]
pub trait ChatStore: std::fmt::Debug + Send + Sync {
    /// Persists a message. Saving the same id twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] on backend failure.
    async fn save_message(&self, message: &ChatMessage) -> Result<(), RelayError>;

    /// Returns up to `limit` of the newest messages in `chat_id`, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] on backend failure.
    async fn fetch_recent_messages(
        &self,
        chat_id: &ChatId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RelayError>;

    /// Looks up a user's display name. `Ok(None)` means not found.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] on backend failure.
    async fn lookup_display_name(&self, user_id: UserId) -> Result<Option<String>, RelayError>;

    /// Returns whether `user_id` may attach to `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] on backend failure.
    async fn user_may_access_chat(
        &self,
        user_id: UserId,
        chat_id: &ChatId,
    ) -> Result<bool, RelayError>;
}

/// Joins first and last name the way profiles display them.
///
/// Returns `None` when both parts are blank.
#[must_use]
pub fn compose_display_name(name: &str, surname: &str) -> Option<String> {
    match (name.trim(), surname.trim()) {
        ("", "") => None,
        (n, "") => Some(n.to_string()),
        ("", s) => Some(s.to_string()),
        (n, s) => Some(format!("{n} {s}")),
    }
}
