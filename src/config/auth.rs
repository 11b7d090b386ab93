//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Session token settings.
///
/// Tokens are HS256 JWTs issued by the Summarizz user service with a shared
/// secret.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,

    /// Cookie the frontend stores the token in
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Clock skew tolerated on `exp`/`nbf`
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

const MIN_PRODUCTION_SECRET_LEN: usize = 32;

impl AuthConfig {
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }

        if production && secret.len() < MIN_PRODUCTION_SECRET_LEN {
            return Err(ValidationError::WeakJwtSecret);
        }

        if self.cookie_name.trim().is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__COOKIE_NAME"));
        }

        Ok(())
    }
}

fn default_cookie_name() -> String {
    "token".to_string()
}

fn default_leeway() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: SecretString::new(secret.to_string()),
            cookie_name: default_cookie_name(),
            leeway_secs: default_leeway(),
        }
    }

    #[test]
    fn empty_secret_is_missing() {
        assert_eq!(
            config("").validate(false),
            Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"))
        );
    }

    #[test]
    fn short_secret_only_allowed_outside_production() {
        assert!(config("dev-secret").validate(false).is_ok());
        assert_eq!(config("dev-secret").validate(true), Err(ValidationError::WeakJwtSecret));
        assert!(config(&"x".repeat(32)).validate(true).is_ok());
    }

    #[test]
    fn blank_cookie_name_is_rejected() {
        let mut c = config("dev-secret");
        c.cookie_name = " ".to_string();
        assert!(c.validate(false).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let rendered = format!("{:?}", config("super-secret-value"));
        assert!(!rendered.contains("super-secret-value"));
    }
}
