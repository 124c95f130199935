//! Axum WebSocket upgrade handler.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::StreamExt;
use serde::Deserialize;

use super::connection::{Connection, read_pump, write_pump};
use crate::app_state::AppState;
use crate::auth::extract_token;
use crate::domain::{ChatId, VerifiedIdentity};
use crate::error::RelayError;
use crate::hub::preload_budget;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Access token; browsers cannot set headers on a WebSocket upgrade.
    pub token: Option<String>,
}

/// `GET /ws/chat/{chat_id}` — Upgrade to a WebSocket scoped to one chat.
///
/// # Errors
///
/// - [`RelayError::Unauthorized`] when the token is missing or invalid.
/// - [`RelayError::InvalidRequest`] when the chat id is empty.
/// - [`RelayError::Forbidden`] when the user may not join the chat.
/// - [`RelayError::Storage`] when the access check itself fails.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RelayError> {
    let (identity, chat_id) = admit(&state, chat_id, params.token.as_deref(), &headers).await?;
    Ok(ws.on_upgrade(move |socket| attach(socket, state, identity, chat_id)))
}

/// Authenticates the caller and authorizes the requested chat.
async fn admit(
    state: &AppState,
    chat_id: String,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<(VerifiedIdentity, ChatId), RelayError> {
    let token = extract_token(query_token, headers)
        .ok_or_else(|| RelayError::Unauthorized("missing token".into()))?;
    let identity = state.verifier.verify(&token)?;

    let chat_id = ChatId::new(chat_id);
    if chat_id.is_empty() {
        return Err(RelayError::InvalidRequest("chat id must not be empty".into()));
    }
    if !state
        .store
        .user_may_access_chat(identity.user_id, &chat_id)
        .await?
    {
        tracing::info!(user_id = %identity.user_id, %chat_id, "chat access denied");
        return Err(RelayError::Forbidden(format!("access denied to chat {chat_id}")));
    }
    Ok((identity, chat_id))
}

/// Admits an upgraded socket: preload history, register, run the pumps.
async fn attach(socket: WebSocket, state: AppState, identity: VerifiedIdentity, chat_id: ChatId) {
    let (conn, registration, outbound) =
        Connection::open(&identity, chat_id, state.hub.outbound_capacity());

    let history_limit = state
        .history_limit
        .min(preload_budget(state.hub.outbound_capacity()));
    if history_limit > 0 {
        match state
            .store
            .fetch_recent_messages(conn.chat_id(), history_limit)
            .await
        {
            Ok(history) => {
                let queued = registration.preload(history);
                tracing::debug!(conn_id = %conn.id(), queued, "history preloaded");
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), error = %e, "failed to load chat history");
            }
        }
    }

    if let Err(e) = state.hub.register(registration).await {
        tracing::error!(conn_id = %conn.id(), error = %e, "could not register connection");
        return;
    }
    tracing::info!(
        conn_id = %conn.id(),
        user_id = %conn.user_id(),
        chat_id = %conn.chat_id(),
        "client connected"
    );

    let (sink, stream) = socket.split();
    tokio::spawn(write_pump(conn.id(), outbound, sink));
    read_pump(conn, state.hub.clone(), stream).await;
}
