//! WebSocket layer: upgrade handler and per-connection pumps.
//!
//! The endpoint at `/ws/chat/{chat_id}` admits one authenticated,
//! authorized client into one chat room.

pub mod connection;
pub mod handler;

pub use connection::{Connection, read_pump, write_pump};
