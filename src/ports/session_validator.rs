//! Session validation port.
//!
//! Validates the session token the Summarizz frontend issues and extracts the
//! user identity. The production implementation verifies an HS256 JWT; tests
//! use a token-to-user map.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};

/// Validates session tokens and extracts user identity.
///
/// HTTP middleware uses this to authenticate the subscription routes.
///
/// # Contract
///
/// Implementations must:
/// - Validate the token signature
/// - Return `AuthError::InvalidToken` for malformed or badly signed tokens
/// - Return `AuthError::TokenExpired` for expired tokens
/// - Return `AuthError::TokenNotActive` for tokens used before `nbf`
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate a raw token (no "Bearer " prefix) and return its user.
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}
