//! Scheduled job port.
//!
//! Background maintenance (expiry sweep, pending link-back, outbox retry) is
//! expressed as jobs that a runner ticks on an interval.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::foundation::DomainError;

/// A unit of periodic background work.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Time between runs.
    fn interval(&self) -> Duration;

    /// Run once. Errors are logged by the runner and do not stop it.
    async fn run_once(&self) -> Result<(), DomainError>;
}
