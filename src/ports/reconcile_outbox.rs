//! ReconcileOutbox port - durable store for failed billing transitions.
//!
//! A webhook is acknowledged to the provider even when applying it fails, so
//! the failed event is written here and replayed by a background job.
//!
//! ## Lifecycle
//!
//! 1. The webhook handler enqueues the event after a failed transition
//! 2. The retry job fetches due entries and re-runs the reconciler
//! 3. Success marks the entry resolved; failure reschedules it with
//!    exponential backoff until the attempt limit abandons it
//! 4. Resolved entries are purged after the retention window

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, OutboxEntryId, Timestamp};
use crate::ports::WebhookEvent;

/// Longest delay between two attempts.
pub const MAX_RETRY_DELAY_SECS: i64 = 24 * 60 * 60;

/// Status of a failed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedTransitionStatus {
    /// Waiting for its next attempt
    Pending,
    /// Replayed successfully
    Resolved,
    /// Gave up after the attempt limit
    Abandoned,
}

impl FailedTransitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailedTransitionStatus::Pending => "pending",
            FailedTransitionStatus::Resolved => "resolved",
            FailedTransitionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(FailedTransitionStatus::Pending),
            "resolved" => Some(FailedTransitionStatus::Resolved),
            "abandoned" => Some(FailedTransitionStatus::Abandoned),
            _ => None,
        }
    }
}

/// Backoff schedule for replaying failed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay_secs: i64,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay_secs: i64, max_attempts: u32) -> Self {
        Self {
            base_delay_secs,
            max_attempts,
        }
    }

    /// Delay before the attempt following `attempts` failures.
    pub fn delay_after(&self, attempts: u32) -> i64 {
        let factor = 2_i64.checked_pow(attempts).unwrap_or(i64::MAX);
        self.base_delay_secs
            .saturating_mul(factor)
            .min(MAX_RETRY_DELAY_SECS)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(30, 5)
    }
}

/// A billing event whose transition failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTransition {
    pub id: OutboxEntryId,

    /// The event to replay
    pub event: WebhookEvent,

    pub status: FailedTransitionStatus,

    /// Failed attempts so far, the original one included
    pub attempts: u32,

    pub last_error: Option<String>,

    pub created_at: Timestamp,

    /// Earliest time the retry job may pick the entry up
    pub next_attempt_at: Timestamp,

    /// When the entry was resolved or abandoned
    pub processed_at: Option<Timestamp>,
}

impl FailedTransition {
    /// Record the first failure of `event`.
    pub fn new(
        event: WebhookEvent,
        error: impl Into<String>,
        now: Timestamp,
        policy: &RetryPolicy,
    ) -> Self {
        Self {
            id: OutboxEntryId::new(),
            event,
            status: FailedTransitionStatus::Pending,
            attempts: 1,
            last_error: Some(error.into()),
            created_at: now,
            next_attempt_at: now.add_secs(policy.delay_after(0)),
            processed_at: None,
        }
    }

    /// Mark the entry replayed.
    pub fn mark_resolved(&mut self, now: Timestamp) {
        self.status = FailedTransitionStatus::Resolved;
        self.processed_at = Some(now);
    }

    /// Record another failure, rescheduling or abandoning the entry.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: Timestamp, policy: &RetryPolicy) {
        self.last_error = Some(error.into());
        if self.attempts + 1 >= policy.max_attempts {
            self.attempts = policy.max_attempts;
            self.status = FailedTransitionStatus::Abandoned;
            self.processed_at = Some(now);
        } else {
            self.next_attempt_at = now.add_secs(policy.delay_after(self.attempts));
            self.attempts += 1;
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.status == FailedTransitionStatus::Abandoned
    }
}

/// Port for the retry outbox.
#[async_trait]
pub trait ReconcileOutbox: Send + Sync {
    /// Store a new failed transition.
    async fn enqueue(&self, entry: &FailedTransition) -> Result<(), DomainError>;

    /// Pending entries whose `next_attempt_at` has passed, oldest first.
    async fn get_due(&self, now: Timestamp, limit: u32)
        -> Result<Vec<FailedTransition>, DomainError>;

    /// Persist the outcome of an attempt.
    async fn update(&self, entry: &FailedTransition) -> Result<(), DomainError>;

    /// Delete resolved entries processed before `before`. Returns the count.
    async fn cleanup_resolved(&self, before: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{WebhookEventData, WebhookEventType};

    fn event() -> WebhookEvent {
        WebhookEvent {
            id: "evt_1".to_string(),
            event_type: WebhookEventType::SubscriptionUpdated,
            data: WebhookEventData::Raw {
                json: "{}".to_string(),
            },
            created_at: 1_735_776_000,
        }
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_735_776_000).unwrap()
    }

    #[test]
    fn reconcile_outbox_is_object_safe() {
        fn _accepts_dyn(_outbox: &dyn ReconcileOutbox) {}
    }

    #[test]
    fn backoff_doubles_and_caps_at_one_day() {
        let policy = RetryPolicy::new(30, 5);
        assert_eq!(policy.delay_after(0), 30);
        assert_eq!(policy.delay_after(1), 60);
        assert_eq!(policy.delay_after(3), 240);
        assert_eq!(policy.delay_after(20), MAX_RETRY_DELAY_SECS);
        assert_eq!(policy.delay_after(80), MAX_RETRY_DELAY_SECS);
    }

    #[test]
    fn new_entry_is_pending_after_first_failure() {
        let policy = RetryPolicy::new(30, 5);
        let entry = FailedTransition::new(event(), "db down", now(), &policy);

        assert_eq!(entry.status, FailedTransitionStatus::Pending);
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.next_attempt_at, now().add_secs(30));
        assert_eq!(entry.last_error.as_deref(), Some("db down"));
    }

    #[test]
    fn failure_reschedules_with_backoff() {
        let policy = RetryPolicy::new(30, 5);
        let mut entry = FailedTransition::new(event(), "db down", now(), &policy);

        entry.mark_failed("still down", now(), &policy);

        assert_eq!(entry.status, FailedTransitionStatus::Pending);
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.next_attempt_at, now().add_secs(60));
    }

    #[test]
    fn failure_at_limit_abandons() {
        let policy = RetryPolicy::new(30, 2);
        let mut entry = FailedTransition::new(event(), "db down", now(), &policy);

        entry.mark_failed("still down", now(), &policy);

        assert!(entry.is_abandoned());
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.processed_at, Some(now()));
    }

    #[test]
    fn resolved_entry_records_processing_time() {
        let policy = RetryPolicy::default();
        let mut entry = FailedTransition::new(event(), "db down", now(), &policy);

        entry.mark_resolved(now());

        assert_eq!(entry.status, FailedTransitionStatus::Resolved);
        assert_eq!(entry.processed_at, Some(now()));
    }

    #[test]
    fn status_parses_stored_values() {
        for status in [
            FailedTransitionStatus::Pending,
            FailedTransitionStatus::Resolved,
            FailedTransitionStatus::Abandoned,
        ] {
            assert_eq!(FailedTransitionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FailedTransitionStatus::parse("published"), None);
    }
}
