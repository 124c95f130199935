//! Lifecycle coordinator: the single writer of registry membership.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::Registration;
use super::registry::Registry;
use crate::domain::ConnectionId;

/// A membership change request.
///
/// Both kinds share one channel so that a connection's unregister can
/// never be processed ahead of its own register.
#[derive(Debug)]
pub enum Membership {
    /// Make the connection eligible for broadcasts.
    Register(Registration),
    /// Remove the connection and close its outbound queue.
    Unregister(ConnectionId),
}

/// Applies membership requests in arrival order until every sender is
/// dropped.
pub(crate) async fn run_coordinator(registry: Arc<Registry>, mut rx: mpsc::Receiver<Membership>) {
    while let Some(request) = rx.recv().await {
        match request {
            Membership::Register(registration) => {
                let conn_id = registration.id();
                let chat_id = registration.chat_id().clone();
                if registry.add(registration).await {
                    tracing::info!(%conn_id, %chat_id, "connection registered");
                } else {
                    tracing::warn!(%conn_id, "duplicate registration ignored");
                }
            }
            Membership::Unregister(conn_id) => {
                if registry.remove(conn_id).await {
                    tracing::info!(%conn_id, "connection unregistered");
                } else {
                    tracing::debug!(%conn_id, "unregister for connection already gone");
                }
            }
        }
    }
    tracing::debug!("lifecycle coordinator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, UserId};

    #[tokio::test]
    async fn unregister_follows_register_in_order() {
        let registry = Arc::new(Registry::new());
        let (tx, rx) = mpsc::channel(8);
        let coordinator = tokio::spawn(run_coordinator(Arc::clone(&registry), rx));

        let (out_tx, mut out_rx) = mpsc::channel(4);
        let id = ConnectionId::new();
        let registration = Registration::new(id, UserId::new(), ChatId::new("room-1"), out_tx);
        let _ = tx.send(Membership::Register(registration)).await;
        let _ = tx.send(Membership::Unregister(id)).await;
        drop(tx);
        let _ = coordinator.await;

        assert!(registry.is_empty().await);
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stray_unregister_is_harmless() {
        let registry = Arc::new(Registry::new());
        let (tx, rx) = mpsc::channel(8);
        let coordinator = tokio::spawn(run_coordinator(Arc::clone(&registry), rx));

        let (out_tx, _out_rx) = mpsc::channel(4);
        let keep =
            Registration::new(ConnectionId::new(), UserId::new(), ChatId::new("room-1"), out_tx);
        let keep_id = keep.id();
        let _ = tx.send(Membership::Unregister(ConnectionId::new())).await;
        let _ = tx.send(Membership::Register(keep)).await;
        drop(tx);
        let _ = coordinator.await;

        assert!(registry.contains(keep_id).await);
    }
}
