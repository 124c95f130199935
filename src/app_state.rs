//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::auth::JwtVerifier;
use crate::hub::Hub;
use crate::persistence::ChatStore;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The running hub.
    pub hub: Hub,
    /// Storage collaborator, for access checks and history.
    pub store: Arc<dyn ChatStore>,
    /// Token verifier.
    pub verifier: Arc<JwtVerifier>,
    /// Recent messages preloaded into a new connection (0 disables).
    pub history_limit: usize,
}
