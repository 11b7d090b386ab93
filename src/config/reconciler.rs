//! Background job configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const MAX_BATCH_SIZE: u32 = 1000;

/// Intervals, batch sizes and retry policy for the scheduled jobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_link_interval")]
    pub link_interval_secs: u64,

    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    #[serde(default = "default_link_batch_size")]
    pub link_batch_size: u32,

    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: i64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// How long resolved outbox entries are kept
    #[serde(default = "default_outbox_retention")]
    pub outbox_retention_hours: i64,

    /// Fill in a missing period end for active subscriptions on status reads
    #[serde(default = "default_true")]
    pub synthesize_missing_period_end: bool,
}

impl ReconcilerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn link_interval(&self) -> Duration {
        Duration::from_secs(self.link_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("sweep_interval_secs"));
        }
        if self.link_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("link_interval_secs"));
        }
        if self.retry_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("retry_interval_secs"));
        }
        if self.retry_base_delay_secs <= 0 {
            return Err(ValidationError::InvalidInterval("retry_base_delay_secs"));
        }
        if self.outbox_retention_hours <= 0 {
            return Err(ValidationError::InvalidInterval("outbox_retention_hours"));
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.link_batch_size) {
            return Err(ValidationError::InvalidBatchSize("link_batch_size"));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.retry_batch_size) {
            return Err(ValidationError::InvalidBatchSize("retry_batch_size"));
        }

        if self.max_retry_attempts == 0 {
            return Err(ValidationError::InvalidRetryAttempts);
        }

        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            link_interval_secs: default_link_interval(),
            retry_interval_secs: default_retry_interval(),
            link_batch_size: default_link_batch_size(),
            retry_batch_size: default_retry_batch_size(),
            retry_base_delay_secs: default_retry_base_delay(),
            max_retry_attempts: default_max_retry_attempts(),
            outbox_retention_hours: default_outbox_retention(),
            synthesize_missing_period_end: true,
        }
    }
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_link_interval() -> u64 {
    60
}

fn default_retry_interval() -> u64 {
    30
}

fn default_link_batch_size() -> u32 {
    100
}

fn default_retry_batch_size() -> u32 {
    50
}

fn default_retry_base_delay() -> i64 {
    30
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_outbox_retention() -> i64 {
    168
}

fn default_true() -> bool {
    true
}
