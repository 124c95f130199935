//! Lazily populated `user_id → display name` cache.
//!
//! Eventually consistent: entries are never invalidated. A miss goes to
//! the store; a failed or empty lookup yields [`UNKNOWN_USER`] and is not
//! cached, so the next message retries.

use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::UserId;
use crate::persistence::ChatStore;

/// Placeholder used when a display name cannot be resolved.
pub const UNKNOWN_USER: &str = "unknown user";

/// Concurrent display-name cache in front of the store.
#[derive(Debug)]
pub struct DisplayNameCache {
    store: Arc<dyn ChatStore>,
    names: DashMap<UserId, String>,
}

impl DisplayNameCache {
    /// Creates an empty cache backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            names: DashMap::new(),
        }
    }

    /// Resolves a display name. Never fails.
    pub async fn resolve(&self, user_id: UserId) -> String {
        if let Some(name) = self.names.get(&user_id) {
            return name.value().clone();
        }
        match self.store.lookup_display_name(user_id).await {
            Ok(Some(name)) => {
                self.names.insert(user_id, name.clone());
                name
            }
            Ok(None) => {
                tracing::debug!(%user_id, "no display name on record");
                UNKNOWN_USER.to_string()
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "display name lookup failed");
                UNKNOWN_USER.to_string()
            }
        }
    }

    /// Number of cached names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
