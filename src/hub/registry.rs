//! The authoritative set of live connections in this process.
//!
//! [`Registry`] maps each [`ConnectionId`] to its [`Registration`], which
//! owns the sending half of the connection's outbound queue. Removing an
//! entry drops that sender, closing the queue and ending the write pump.
//!
//! # Concurrency
//!
//! - Membership is added and removed only by the coordinator task.
//! - Broadcast holds the read lock for its whole iteration, so every
//!   connection it observes is registered at that instant.
//! - Connections that cannot take a message are evicted under the write
//!   lock before [`Registry::broadcast`] returns.

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};

use crate::domain::{ChatId, ChatMessage, ConnectionId, UserId};

/// A connection's entry in the registry.
///
/// Moved into the registry on registration, so the same value can never
/// be registered twice; a client must open a new connection to rejoin.
#[derive(Debug)]
pub struct Registration {
    id: ConnectionId,
    user_id: UserId,
    chat_id: ChatId,
    outbound: mpsc::Sender<ChatMessage>,
}

impl Registration {
    /// Creates a registration that delivers into `outbound`.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        user_id: UserId,
        chat_id: ChatId,
        outbound: mpsc::Sender<ChatMessage>,
    ) -> Self {
        Self {
            id,
            user_id,
            chat_id,
            outbound,
        }
    }

    /// Connection this registration belongs to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Room the connection is scoped to.
    #[must_use]
    pub const fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// Queues history ahead of live traffic and returns how many messages
    /// were queued.
    ///
    /// At most half of the outbound queue is used, keeping the newest
    /// messages, so a fresh connection is never evicted by the first
    /// live broadcast into its room.
    pub fn preload(&self, history: Vec<ChatMessage>) -> usize {
        let budget = preload_budget(self.outbound.max_capacity());
        let skip = history.len().saturating_sub(budget);
        let mut queued = 0;
        for message in history.into_iter().skip(skip) {
            if self.outbound.try_send(message).is_err() {
                break;
            }
            queued += 1;
        }
        queued
    }
}

/// History slots available in an outbound queue of `capacity`.
#[must_use]
pub const fn preload_budget(capacity: usize) -> usize {
    capacity / 2
}

/// Outcome of one broadcast round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the message was queued for.
    pub delivered: usize,
    /// Connections evicted because their queue was full or closed.
    pub evicted: Vec<ConnectionId>,
}

/// Live connection set.
#[derive(Debug, Default)]
pub struct Registry {
    members: RwLock<HashMap<ConnectionId, Registration>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a connection eligible for broadcasts. Returns `false` if a
    /// connection with the same id is already registered.
    pub async fn add(&self, registration: Registration) -> bool {
        let mut members = self.members.write().await;
        if members.contains_key(&registration.id) {
            return false;
        }
        members.insert(registration.id, registration);
        true
    }

    /// Removes a connection, closing its outbound queue. Returns `false`
    /// if it was not registered (already removed or evicted).
    pub async fn remove(&self, id: ConnectionId) -> bool {
        self.members.write().await.remove(&id).is_some()
    }

    /// Queues `message` for every connection whose room receives it.
    ///
    /// Enqueue never blocks. A connection whose queue is full (or whose
    /// write pump is gone) is evicted before this returns and receives
    /// nothing further.
    pub async fn broadcast(&self, message: &ChatMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        {
            let members = self.members.read().await;
            for member in members.values() {
                if !member.chat_id.receives(&message.chat_id) {
                    continue;
                }
                match member.outbound.try_send(message.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            conn_id = %member.id,
                            user_id = %member.user_id,
                            chat_id = %member.chat_id,
                            "outbound queue full, evicting slow connection"
                        );
                        report.evicted.push(member.id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!(conn_id = %member.id, "outbound queue closed, evicting");
                        report.evicted.push(member.id);
                    }
                }
            }
        }
        if !report.evicted.is_empty() {
            let mut members = self.members.write().await;
            for id in &report.evicted {
                let _ = members.remove(id);
            }
        }
        report
    }

    /// Returns `true` if the connection is currently registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.members.read().await.contains_key(&id)
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}
