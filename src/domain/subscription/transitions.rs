//! Reconciliation rules.
//!
//! Every transition is an idempotent overwrite derived from provider state and
//! the processing time, never a delta against what is stored. Replaying an
//! event therefore converges to the same record.

use crate::domain::foundation::Timestamp;

use super::{PendingSubscription, SubscriptionStatus, SubscriptionTier, SubscriptionUpdate};

/// Access window after a failed payment.
pub const GRACE_PERIOD_DAYS: i64 = 7;

/// Assumed billing cycle when an active subscription has no stored period end.
pub const PERIOD_END_FALLBACK_DAYS: i64 = 30;

impl SubscriptionUpdate {
    /// A new subscription became visible for a customer.
    ///
    /// Promotes to pro and clears any earlier cancellation.
    pub fn subscription_created(
        subscription_id: impl Into<String>,
        status: SubscriptionStatus,
        period_start: Option<Timestamp>,
        period_end: Option<Timestamp>,
    ) -> Self {
        Self::new()
            .with_status(status)
            .with_tier(SubscriptionTier::Pro)
            .with_subscription_id(subscription_id)
            .with_period(period_start, period_end)
            .with_canceled_at(None)
    }

    /// Provider state for an existing subscription changed.
    pub fn subscription_updated(
        status: SubscriptionStatus,
        period_start: Option<Timestamp>,
        period_end: Option<Timestamp>,
    ) -> Self {
        Self::new().with_status(status).with_period(period_start, period_end)
    }

    /// The subscription was canceled, by webhook or by a direct request.
    ///
    /// Both paths go through here so they always agree on `canceled_at`.
    pub fn subscription_canceled(provider_canceled_at: Option<Timestamp>, now: Timestamp) -> Self {
        Self::new()
            .with_status(SubscriptionStatus::Canceled)
            .with_canceled_at(Some(provider_canceled_at.unwrap_or(now)))
    }

    /// An invoice payment failed at `now`.
    pub fn payment_failed(now: Timestamp) -> Self {
        Self::new()
            .with_status(SubscriptionStatus::PastDue)
            .with_grace_period_end(Some(grace_period_end(now)))
    }

    /// Cancellation period or grace window has lapsed.
    pub fn expiry_demotion() -> Self {
        Self::new()
            .with_tier(SubscriptionTier::Free)
            .with_status(SubscriptionStatus::Canceled)
    }

    /// Status re-read from the provider on an explicit refresh.
    pub fn refreshed_status(status: SubscriptionStatus) -> Self {
        Self::new().with_status(status)
    }

    /// Folds a buffered pending record into its newly found owner.
    pub fn link_pending(pending: &PendingSubscription, now: &Timestamp) -> Self {
        let mut update = Self::new()
            .with_subscription_id(pending.stripe_subscription_id.clone())
            .with_status(pending.status.clone())
            .with_tier(linked_tier(pending, now))
            .with_period(pending.period_start, pending.period_end);

        if let Some(customer_id) = &pending.stripe_customer_id {
            update = update.with_customer_id(customer_id.clone());
        }
        if pending.status == SubscriptionStatus::Canceled {
            update = update.with_canceled_at(pending.canceled_at);
        } else {
            update = update.with_canceled_at(None);
        }
        if pending.grace_period_end.is_some() {
            update = update.with_grace_period_end(pending.grace_period_end);
        }
        if let Some(event_at) = pending.last_event_at {
            update = update.observed_at(event_at);
        }
        update
    }
}

/// End of the grace window for a payment failure processed at `failed_at`.
pub fn grace_period_end(failed_at: Timestamp) -> Timestamp {
    failed_at.add_days(GRACE_PERIOD_DAYS)
}

/// Heuristic period end for an active subscription missing one.
pub fn fallback_period_end(base: Timestamp) -> Timestamp {
    base.add_days(PERIOD_END_FALLBACK_DAYS)
}

/// A canceled subscription keeps pro only while its paid period is running.
fn linked_tier(pending: &PendingSubscription, now: &Timestamp) -> SubscriptionTier {
    match (&pending.status, &pending.period_end) {
        (SubscriptionStatus::Free, _) => SubscriptionTier::Free,
        (SubscriptionStatus::Canceled, Some(end)) if end.is_after(now) => SubscriptionTier::Pro,
        (SubscriptionStatus::Canceled, _) => SubscriptionTier::Free,
        _ => SubscriptionTier::Pro,
    }
}
