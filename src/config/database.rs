//! Database configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// PostgreSQL connection settings.
///
/// An empty `url` selects the in-memory stores, which is only allowed outside
/// production.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    /// Apply embedded migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if !self.is_configured() {
            return if production {
                Err(ValidationError::MissingRequired("DATABASE__URL"))
            } else {
                Ok(())
            };
        }

        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }

        if self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }

        if self.max_connections > 100 {
            return Err(ValidationError::PoolSizeTooLarge);
        }

        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            run_migrations: default_run_migrations(),
        }
    }
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}

fn default_run_migrations() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postgres(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let config = DatabaseConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.max_connections, 10);
        assert!(config.run_migrations);
        assert_eq!(config.idle_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn missing_url_is_fine_outside_production() {
        assert!(DatabaseConfig::default().validate(false).is_ok());
        assert_eq!(
            DatabaseConfig::default().validate(true),
            Err(ValidationError::MissingRequired("DATABASE__URL"))
        );
    }

    #[test]
    fn non_postgres_url_is_rejected() {
        assert_eq!(
            postgres("mysql://localhost/summarizz").validate(false),
            Err(ValidationError::InvalidDatabaseUrl)
        );
    }

    #[test]
    fn pool_bounds() {
        let inverted = DatabaseConfig {
            min_connections: 10,
            max_connections: 5,
            ..postgres("postgres://localhost/summarizz")
        };
        assert_eq!(inverted.validate(true), Err(ValidationError::InvalidPoolSize));

        let huge = DatabaseConfig {
            max_connections: 150,
            ..postgres("postgres://localhost/summarizz")
        };
        assert_eq!(huge.validate(true), Err(ValidationError::PoolSizeTooLarge));
    }

    #[test]
    fn valid_url_passes() {
        assert!(postgres("postgresql://app:pw@db:5432/summarizz")
            .validate(true)
            .is_ok());
    }
}
