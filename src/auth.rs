//! Token verification at the connection boundary.
//!
//! Clients present an HS256 JWT either as the `token` query parameter
//! (browsers cannot set headers on a WebSocket upgrade) or as an
//! `Authorization: Bearer` header. [`JwtVerifier`] turns a valid token
//! into a [`VerifiedIdentity`]; nothing past this module sees claims.

use std::fmt;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::{UserId, VerifiedIdentity};
use crate::error::RelayError;

/// Claims carried by a relay access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user id (UUID string).
    pub user_uuid: String,
    /// Optional email claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    pub exp: u64,
}

/// Verifies HS256 tokens signed with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Creates a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validates `token` and extracts the caller's identity.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Unauthorized`] if the signature, algorithm or
    /// expiry is invalid, or if `user_uuid` is not a UUID.
    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, RelayError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| RelayError::Unauthorized(format!("invalid token: {e}")))?;
        let user_id = data
            .claims
            .user_uuid
            .parse::<uuid::Uuid>()
            .map_err(|_| RelayError::Unauthorized("invalid user_uuid in token".into()))?;
        Ok(VerifiedIdentity {
            user_id: UserId::from_uuid(user_id),
            email: data.claims.email,
        })
    }
}

/// Picks the token from the query string, falling back to a bearer header.
#[must_use]
pub fn extract_token(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn token(user_uuid: &str, secret: &[u8], exp_offset: i64) -> String {
        let exp = u64::try_from(chrono::Utc::now().timestamp() + exp_offset).unwrap_or(0);
        let claims = Claims {
            user_uuid: user_uuid.to_string(),
            email: Some("ada@example.com".to_string()),
            exp,
        };
        let Ok(token) = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        ) else {
            panic!("encode failed");
        };
        token
    }

    #[test]
    fn valid_token_yields_identity() {
        let user = uuid::Uuid::new_v4();
        let verifier = JwtVerifier::new(SECRET);
        let Ok(identity) = verifier.verify(&token(&user.to_string(), SECRET, 3600)) else {
            panic!("token should verify");
        };
        assert_eq!(identity.user_id, UserId::from_uuid(user));
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let result = verifier.verify(&token(&uuid::Uuid::new_v4().to_string(), b"other", 3600));
        assert!(matches!(result, Err(RelayError::Unauthorized(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let result = verifier.verify(&token(&uuid::Uuid::new_v4().to_string(), SECRET, -3600));
        assert!(matches!(result, Err(RelayError::Unauthorized(_))));
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let result = verifier.verify(&token("not-a-uuid", SECRET, 3600));
        assert!(matches!(result, Err(RelayError::Unauthorized(_))));
    }

    #[test]
    fn query_token_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(
            extract_token(Some("from-query"), &headers).as_deref(),
            Some("from-query")
        );
        assert_eq!(extract_token(None, &headers).as_deref(), Some("from-header"));
        assert_eq!(extract_token(Some(""), &HeaderMap::new()), None);
    }
}
