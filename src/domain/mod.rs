//! Domain layer: identifiers, rooms, messages and caller identity.
//!
//! Everything here is plain data. Concurrency lives in [`crate::hub`] and
//! [`crate::ws`].

pub mod chat_id;
pub mod identity;
pub mod ids;
pub mod message;

pub use chat_id::{ChatId, ChatKind};
pub use identity::VerifiedIdentity;
pub use ids::{ConnectionId, MessageId, UserId};
pub use message::{ChatMessage, FrameRejection, InboundFrame, Submission};
