//! Room identifiers and the room-id naming convention.
//!
//! A [`ChatId`] is an opaque string. Two conventions are baked in:
//! ids starting with [`GROUP_PREFIX`] denote group chats, and the literal
//! [`GLOBAL_CHAT`] matches every connection regardless of its own room.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved prefix marking a group chat.
pub const GROUP_PREFIX: &str = "group-";

/// Sentinel room id that matches every connection.
pub const GLOBAL_CHAT: &str = "global";

/// Scoping key that decides which connections receive a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Wraps a room id. Emptiness is checked by callers that accept
    /// client input; see [`ChatId::is_empty`].
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the `"global"` sentinel room.
    #[must_use]
    pub fn global() -> Self {
        Self(GLOBAL_CHAT.to_string())
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty id, which is never a valid room.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` for the `"global"` sentinel.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_CHAT
    }

    /// Derives the chat kind from the id prefix.
    #[must_use]
    pub fn kind(&self) -> ChatKind {
        if self.0.starts_with(GROUP_PREFIX) {
            ChatKind::Group
        } else {
            ChatKind::Direct
        }
    }

    /// Returns `true` if a connection scoped to `self` should receive a
    /// message addressed to `target`.
    #[must_use]
    pub fn receives(&self, target: &ChatId) -> bool {
        self == target || self.is_global() || target.is_global()
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChatId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Chat kind, derived from the room-id naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// One-to-one conversation.
    Direct,
    /// Multi-participant room (id starts with `group-`).
    Group,
}

impl ChatKind {
    /// Wire/storage string for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}
