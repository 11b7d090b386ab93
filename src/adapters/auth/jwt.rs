//! HS256 session token validator.
//!
//! Summarizz sessions are signed by the account service with a shared
//! secret. The token carries the platform user id in `uid` and the
//! account email in `email`; `exp` is mandatory and `nbf` is honoured when
//! present.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::SessionValidator;

/// Claims carried by a Summarizz session token.
#[derive(Debug, Deserialize)]
struct SessionClaims {
    uid: String,
    email: String,
    #[allow(dead_code)]
    exp: i64,
}

/// Validates HS256 session tokens against the shared signing secret.
pub struct JwtSessionValidator {
    secret: SecretString,
    leeway_secs: u64,
}

impl JwtSessionValidator {
    /// Default clock skew tolerance applied to `exp` and `nbf`.
    pub const DEFAULT_LEEWAY_SECS: u64 = 30;

    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            leeway_secs: Self::DEFAULT_LEEWAY_SECS,
        }
    }

    /// Overrides the clock skew tolerance.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);
        validation
    }
}

#[async_trait]
impl SessionValidator for JwtSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return Err(AuthError::service_unavailable("JWT secret is not configured"));
        }

        let key = DecodingKey::from_secret(secret.as_bytes());
        let data = decode::<SessionClaims>(token, &key, &self.validation()).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    tracing::debug!("Session token expired");
                    AuthError::TokenExpired
                }
                ErrorKind::ImmatureSignature => {
                    tracing::debug!("Session token not yet valid");
                    AuthError::TokenNotActive
                }
                _ => {
                    tracing::warn!("Session token validation failed: {}", e);
                    AuthError::InvalidToken
                }
            }
        })?;

        let claims = data.claims;
        let user_id = UserId::new(&claims.uid).map_err(|_| {
            tracing::warn!("Session token carries an empty uid");
            AuthError::InvalidToken
        })?;

        Ok(AuthenticatedUser::new(user_id, claims.email))
    }
}

impl std::fmt::Debug for JwtSessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSessionValidator")
            .field("secret", &"[REDACTED]")
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}
