//! Mock session validator for tests.
//!
//! Maps opaque token strings to users so HTTP tests can authenticate without
//! minting real JWTs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::SessionValidator;

/// Token-to-user lookup. Unknown tokens return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockSessionValidator {
    tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    force_error: RwLock<Option<AuthError>>,
}

impl MockSessionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as belonging to `user`.
    ///
    /// # Panics
    ///
    /// Panics if the token map lock is poisoned.
    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.tokens
            .write()
            .expect("MockSessionValidator: lock poisoned")
            .insert(token.into(), user);
        self
    }

    /// Registers `token` for a user with a generated email.
    ///
    /// # Panics
    ///
    /// Panics if `user_id` is blank.
    pub fn with_test_user(self, token: impl Into<String>, user_id: &str) -> Self {
        let user = AuthenticatedUser::new(
            UserId::new(user_id).expect("test user id must not be blank"),
            format!("{}@test.summarizz.app", user_id),
        );
        self.with_user(token, user)
    }

    /// Forces every validation to fail with `error`.
    ///
    /// # Panics
    ///
    /// Panics if the error lock is poisoned.
    pub fn with_error(self, error: AuthError) -> Self {
        *self
            .force_error
            .write()
            .expect("MockSessionValidator: lock poisoned") = Some(error);
        self
    }
}

#[async_trait]
impl SessionValidator for MockSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let forced = self
            .force_error
            .read()
            .map_err(|_| AuthError::service_unavailable("mock validator lock poisoned"))?
            .clone();
        if let Some(error) = forced {
            return Err(error);
        }

        self.tokens
            .read()
            .map_err(|_| AuthError::service_unavailable("mock validator lock poisoned"))?
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_token_resolves_user() {
        let validator = MockSessionValidator::new().with_test_user("tok", "uid-1");

        let user = validator.validate("tok").await.unwrap();
        assert_eq!(user.id.as_str(), "uid-1");
        assert_eq!(user.email, "uid-1@test.summarizz.app");
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let validator = MockSessionValidator::new();
        assert_eq!(
            validator.validate("nope").await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn forced_error_wins_over_known_token() {
        let validator = MockSessionValidator::new()
            .with_test_user("tok", "uid-1")
            .with_error(AuthError::TokenExpired);

        assert_eq!(validator.validate("tok").await, Err(AuthError::TokenExpired));
    }
}
