//! HTTP surface: router composition and system endpoints.

pub mod system;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete router: WebSocket endpoint plus system routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/chat/{chat_id}", get(ws_handler))
        .merge(system::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
