//! Pending-association buffer record.
//!
//! Holds billing facts for a subscription whose owner is not known yet,
//! typically because Stripe delivered `customer.subscription.created` before
//! checkout persisted the customer id on the user.

use crate::domain::foundation::{Timestamp, UserId};

use super::{SubscriptionStatus, SubscriptionUpdate};

/// Buffered subscription facts keyed by Stripe subscription id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubscription {
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub grace_period_end: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Set once the record has been folded into a user.
    pub processed: bool,
    pub linked_user_id: Option<UserId>,
    pub last_event_at: Option<Timestamp>,
    /// Last time the linker looked for an owner and found none.
    pub last_link_attempt_at: Option<Timestamp>,
}

impl PendingSubscription {
    /// Creates an unprocessed record. The status is refined by the first update.
    pub fn new(
        stripe_subscription_id: impl Into<String>,
        stripe_customer_id: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            stripe_subscription_id: stripe_subscription_id.into(),
            stripe_customer_id,
            status: SubscriptionStatus::Free,
            period_start: None,
            period_end: None,
            canceled_at: None,
            grace_period_end: None,
            created_at: now,
            updated_at: now,
            processed: false,
            linked_user_id: None,
            last_event_at: None,
            last_link_attempt_at: None,
        }
    }

    /// Whether an event stamped `event_at` may still be applied.
    pub fn accepts_event_at(&self, event_at: &Timestamp) -> bool {
        match &self.last_event_at {
            Some(last) => !event_at.is_before(last),
            None => true,
        }
    }

    /// Refreshes buffered fields from the same patch a user would receive.
    ///
    /// Tier and subscription id have no meaning on a pending record and are
    /// ignored. `created_at` is preserved.
    pub fn apply(&mut self, update: &SubscriptionUpdate, now: Timestamp) {
        if let Some(status) = &update.status {
            self.status = status.clone();
        }
        if let Some(customer_id) = &update.stripe_customer_id {
            self.stripe_customer_id = Some(customer_id.clone());
        }
        if let Some(start) = update.period_start {
            self.period_start = Some(start);
        }
        if let Some(end) = update.period_end {
            self.period_end = Some(end);
        }
        if let Some(canceled_at) = update.canceled_at {
            self.canceled_at = canceled_at;
        }
        if let Some(grace) = update.grace_period_end {
            self.grace_period_end = grace;
        }
        if let Some(event_at) = update.last_event_at {
            self.last_event_at = Some(event_at);
        }
        self.updated_at = now;
    }

    /// Retires the record after its facts were applied to `user_id`.
    pub fn mark_linked(&mut self, user_id: UserId, now: Timestamp) {
        self.processed = true;
        self.linked_user_id = Some(user_id);
        self.updated_at = now;
    }
}
