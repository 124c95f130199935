//! In-process implementation of [`ChatStore`].
//!
//! Used when `PERSISTENCE_ENABLED=false` and as the store in tests. With
//! open access (the default) every user may join every chat; call
//! [`MemoryStore::restricted`] to enforce explicit grants.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::ChatStore;
use crate::domain::{ChatId, ChatMessage, UserId};
use crate::error::RelayError;

/// Message log, user directory and chat membership held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<ChatMessage>>,
    names: DashMap<UserId, String>,
    members: DashMap<ChatId, HashSet<UserId>>,
    restricted: bool,
    fail_saves: AtomicBool,
    fail_lookups: AtomicBool,
    save_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store with open access.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store where only granted users may join a chat.
    #[must_use]
    pub fn restricted() -> Self {
        Self {
            restricted: true,
            ..Self::default()
        }
    }

    /// Registers a display name for a user.
    pub fn set_display_name(&self, user_id: UserId, name: impl Into<String>) {
        self.names.insert(user_id, name.into());
    }

    /// Grants `user_id` access to `chat_id`.
    pub fn grant(&self, chat_id: ChatId, user_id: UserId) {
        self.members.entry(chat_id).or_default().insert(user_id);
    }

    /// Makes subsequent saves fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    /// Makes subsequent name lookups fail.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::Relaxed);
    }

    /// Number of `save_message` calls so far, including failed ones.
    #[must_use]
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::Relaxed)
    }

    /// Number of `lookup_display_name` calls so far.
    #[must_use]
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::Relaxed)
    }

    /// Snapshot of every stored message in insertion order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn save_message(&self, message: &ChatMessage) -> Result<(), RelayError> {
        let _ = self.save_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(RelayError::Storage("memory store rejecting writes".into()));
        }
        let mut messages = self.messages.lock().await;
        if !messages.iter().any(|m| m.id == message.id) {
            messages.push(message.clone());
        }
        Ok(())
    }

    async fn fetch_recent_messages(
        &self,
        chat_id: &ChatId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RelayError> {
        let messages = self.messages.lock().await;
        let mut recent: Vec<ChatMessage> = messages
            .iter()
            .rev()
            .filter(|m| &m.chat_id == chat_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn lookup_display_name(&self, user_id: UserId) -> Result<Option<String>, RelayError> {
        let _ = self.lookup_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_lookups.load(Ordering::Relaxed) {
            return Err(RelayError::Storage("memory store rejecting lookups".into()));
        }
        Ok(self.names.get(&user_id).map(|name| name.value().clone()))
    }

    async fn user_may_access_chat(
        &self,
        user_id: UserId,
        chat_id: &ChatId,
    ) -> Result<bool, RelayError> {
        if !self.restricted || chat_id.is_global() {
            return Ok(true);
        }
        Ok(self
            .members
            .get(chat_id)
            .is_some_and(|members| members.contains(&user_id)))
    }
}
