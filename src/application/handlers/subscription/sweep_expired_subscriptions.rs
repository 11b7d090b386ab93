//! SweepExpiredSubscriptionsHandler - demotes Pro users whose access ran out.
//!
//! A canceled subscription keeps Pro until `period_end`; a past-due one until
//! `grace_period_end`. Both comparisons are strict. Demotion only touches
//! tier and status, so running the sweep twice is harmless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{Clock, ScheduledJob, UpdateResult, UserSubscriptionRepository};

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub scanned: usize,
    pub demoted: usize,
    pub failed: usize,
}

pub struct SweepExpiredSubscriptionsHandler {
    users: Arc<dyn UserSubscriptionRepository>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl SweepExpiredSubscriptionsHandler {
    pub fn new(
        users: Arc<dyn UserSubscriptionRepository>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            users,
            clock,
            interval,
        }
    }

    pub async fn handle(&self) -> Result<SweepResult, DomainError> {
        let now = self.clock.now();
        let candidates = self.users.find_expiry_candidates(now).await?;
        let mut result = SweepResult {
            scanned: candidates.len(),
            ..SweepResult::default()
        };

        for user in candidates {
            if !user.expiry_due(&now) {
                continue;
            }

            match self.users.demote_if_expired(&user.user_id, now).await {
                Ok(UpdateResult::Applied) => {
                    tracing::info!(user_id = %user.user_id, "Expired subscription demoted to free");
                    result.demoted += 1;
                }
                Ok(UpdateResult::Stale) => {
                    tracing::info!(user_id = %user.user_id, "Subscription changed since scan, not demoted");
                }
                Ok(UpdateResult::NotFound) => {
                    tracing::warn!(user_id = %user.user_id, "Expired user disappeared before demotion");
                }
                Err(e) => {
                    tracing::error!(user_id = %user.user_id, error = %e, "Failed to demote expired subscription");
                    result.failed += 1;
                }
            }
        }

        if result.scanned > 0 {
            tracing::info!(
                scanned = result.scanned,
                demoted = result.demoted,
                failed = result.failed,
                "Expiry sweep finished"
            );
        }

        Ok(result)
    }
}

#[async_trait]
impl ScheduledJob for SweepExpiredSubscriptionsHandler {
    fn name(&self) -> &'static str {
        "expiry_sweep"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> Result<(), DomainError> {
        self.handle().await.map(|_| ())
    }
}
