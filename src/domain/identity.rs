//! Verified caller identity handed to the relay by the auth boundary.

use super::UserId;

/// An identity whose token has already been validated.
///
/// The relay trusts this value without re-checking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Authenticated user.
    pub user_id: UserId,
    /// Email claim, when the token carried one.
    pub email: Option<String>,
}

impl VerifiedIdentity {
    /// Creates an identity without an email claim.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
        }
    }
}
