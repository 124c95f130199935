//! # chat-relay
//!
//! Real-time chat relay. Clients hold a WebSocket scoped to one chat
//! room; messages they send are fanned out to every connection in that
//! room, in this process and in every peer process sharing the same
//! pub/sub bus.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── WS Handler + pumps (ws/)
//!     │
//!     ├── Hub (hub/)
//!     │     ├── Coordinator ── Registry
//!     │     └── Dispatcher ─── echo filter
//!     │
//!     ├── Bus bridge (bus/) ── Redis pub/sub
//!     │
//!     └── Storage collaborator (persistence/) ── PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod persistence;
pub mod ws;
