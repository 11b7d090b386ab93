//! RetryFailedTransitionsHandler - replays webhook events that failed to reconcile.
//!
//! Entries back off exponentially and are abandoned after the configured
//! number of attempts. Resolved entries older than the retention window are
//! purged on every pass.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{
    Clock, FailedTransition, FailedTransitionStatus, ReconcileOutbox, RetryPolicy, ScheduledJob,
};

use super::ReconcileBillingEventHandler;

/// Retry job settings.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub policy: RetryPolicy,
    pub batch_size: u32,
    pub retention_hours: i64,
    pub interval: Duration,
}

/// Counters from one retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryResult {
    pub due: usize,
    pub resolved: usize,
    pub rescheduled: usize,
    pub abandoned: usize,
    /// Entries whose new state could not be saved; they come back next pass.
    pub failed: usize,
    pub purged: u64,
}

pub struct RetryFailedTransitionsHandler {
    outbox: Arc<dyn ReconcileOutbox>,
    reconciler: Arc<ReconcileBillingEventHandler>,
    clock: Arc<dyn Clock>,
    settings: RetrySettings,
}

impl RetryFailedTransitionsHandler {
    pub fn new(
        outbox: Arc<dyn ReconcileOutbox>,
        reconciler: Arc<ReconcileBillingEventHandler>,
        clock: Arc<dyn Clock>,
        settings: RetrySettings,
    ) -> Self {
        Self {
            outbox,
            reconciler,
            clock,
            settings,
        }
    }

    pub async fn handle(&self) -> Result<RetryResult, DomainError> {
        let now = self.clock.now();
        let entries = self.outbox.get_due(now, self.settings.batch_size).await?;
        let mut result = RetryResult {
            due: entries.len(),
            ..RetryResult::default()
        };

        for mut entry in entries {
            self.replay(&mut entry).await;
            if let Err(e) = self.outbox.update(&entry).await {
                tracing::error!(
                    event_id = %entry.event.id,
                    error = %e,
                    "Failed to save outbox entry"
                );
                result.failed += 1;
                continue;
            }
            match entry.status {
                FailedTransitionStatus::Resolved => result.resolved += 1,
                FailedTransitionStatus::Abandoned => result.abandoned += 1,
                FailedTransitionStatus::Pending => result.rescheduled += 1,
            }
        }

        let cutoff = now.add_secs(-self.settings.retention_hours * 3600);
        result.purged = self.outbox.cleanup_resolved(cutoff).await?;

        if result.due > 0 || result.purged > 0 {
            tracing::info!(
                due = result.due,
                resolved = result.resolved,
                rescheduled = result.rescheduled,
                abandoned = result.abandoned,
                failed = result.failed,
                purged = result.purged,
                "Retry pass finished"
            );
        }

        Ok(result)
    }

    async fn replay(&self, entry: &mut FailedTransition) {
        let now = self.clock.now();
        match self.reconciler.handle(&entry.event).await {
            Ok(outcome) => {
                tracing::info!(
                    event_id = %entry.event.id,
                    attempts = entry.attempts,
                    ?outcome,
                    "Queued billing event reconciled"
                );
                entry.mark_resolved(now);
            }
            Err(e) => {
                entry.mark_failed(e.to_string(), now, &self.settings.policy);
                if entry.is_abandoned() {
                    tracing::error!(
                        event_id = %entry.event.id,
                        event_type = entry.event.event_type.as_str(),
                        attempts = entry.attempts,
                        error = %e,
                        "Giving up on billing event"
                    );
                } else {
                    tracing::warn!(
                        event_id = %entry.event.id,
                        attempts = entry.attempts,
                        next_attempt_at = %entry.next_attempt_at.to_rfc3339(),
                        error = %e,
                        "Billing event retry failed"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl ScheduledJob for RetryFailedTransitionsHandler {
    fn name(&self) -> &'static str {
        "reconcile_retry"
    }

    fn interval(&self) -> Duration {
        self.settings.interval
    }

    async fn run_once(&self) -> Result<(), DomainError> {
        self.handle().await.map(|_| ())
    }
}
