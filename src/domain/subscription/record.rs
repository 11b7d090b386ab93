//! The subscription subset of a user record and the patch type that mutates it.

use crate::domain::foundation::{Timestamp, UserId};

use super::{SubscriptionStatus, SubscriptionTier};

/// Subscription fields of a platform user.
///
/// `status` and `tier` are `None` until the first billing interaction; readers
/// present that as `free`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSubscription {
    pub user_id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub tier: Option<SubscriptionTier>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub grace_period_end: Option<Timestamp>,
    pub subscription_created_at: Option<Timestamp>,
    /// Provider timestamp of the newest billing event applied to this record.
    pub last_event_at: Option<Timestamp>,
}

impl UserSubscription {
    /// Creates a user with no subscription history.
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            first_name: None,
            last_name: None,
            status: None,
            tier: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            period_start: None,
            period_end: None,
            canceled_at: None,
            grace_period_end: None,
            subscription_created_at: None,
            last_event_at: None,
        }
    }

    /// Sets first and last name.
    pub fn with_names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Status as presented to clients.
    pub fn status_or_free(&self) -> SubscriptionStatus {
        self.status.clone().unwrap_or(SubscriptionStatus::Free)
    }

    /// Tier as presented to clients.
    pub fn tier_or_free(&self) -> SubscriptionTier {
        self.tier.unwrap_or(SubscriptionTier::Free)
    }

    /// Name sent to the billing provider when creating a customer.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// True when checkout must be refused in favour of the management view.
    pub fn has_active_pro(&self) -> bool {
        self.status == Some(SubscriptionStatus::Active) && self.tier == Some(SubscriptionTier::Pro)
    }

    /// Subscription id a cancellation request may act on.
    ///
    /// Requires a known, non-canceled status and a stored subscription id.
    pub fn cancellable_subscription_id(&self) -> Option<&str> {
        match &self.status {
            None | Some(SubscriptionStatus::Canceled) => None,
            Some(_) => self.stripe_subscription_id.as_deref(),
        }
    }

    /// Whether an event stamped `event_at` may still be applied.
    ///
    /// Equal timestamps are accepted so that redelivery stays idempotent.
    pub fn accepts_event_at(&self, event_at: &Timestamp) -> bool {
        match &self.last_event_at {
            Some(last) => !event_at.is_before(last),
            None => true,
        }
    }

    /// Whether the sweeper must demote this user at `now`.
    pub fn expiry_due(&self, now: &Timestamp) -> bool {
        if self.tier != Some(SubscriptionTier::Pro) {
            return false;
        }

        match &self.status {
            Some(SubscriptionStatus::Canceled) => {
                matches!(&self.period_end, Some(end) if end.is_before(now))
            }
            Some(SubscriptionStatus::PastDue) => {
                matches!(&self.grace_period_end, Some(end) if end.is_before(now))
            }
            _ => false,
        }
    }

    /// Applies a patch in place. Untouched fields keep their value.
    pub fn apply(&mut self, update: &SubscriptionUpdate) {
        if let Some(status) = &update.status {
            self.status = Some(status.clone());
        }
        if let Some(tier) = update.tier {
            self.tier = Some(tier);
        }
        if let Some(customer_id) = &update.stripe_customer_id {
            self.stripe_customer_id = Some(customer_id.clone());
        }
        if let Some(subscription_id) = &update.stripe_subscription_id {
            self.stripe_subscription_id = Some(subscription_id.clone());
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
        if let Some(created) = update.subscription_created_at {
            self.subscription_created_at = Some(created);
        }
        if let Some(event_at) = update.last_event_at {
            self.last_event_at = Some(event_at);
        }
    }
}

/// Field-level overwrite of subscription state.
///
/// `None` leaves a field untouched. The nullable fields use a nested option:
/// `Some(None)` writes null, which is how a new subscription clears an old
/// cancellation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub status: Option<SubscriptionStatus>,
    pub tier: Option<SubscriptionTier>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub canceled_at: Option<Option<Timestamp>>,
    pub grace_period_end: Option<Option<Timestamp>>,
    pub subscription_created_at: Option<Timestamp>,
    /// Ordering stamp; when set, stores refuse to apply the patch over a newer one.
    pub last_event_at: Option<Timestamp>,
}

impl SubscriptionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: SubscriptionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_tier(mut self, tier: SubscriptionTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.stripe_customer_id = Some(customer_id.into());
        self
    }

    pub fn with_subscription_id(mut self, subscription_id: impl Into<String>) -> Self {
        self.stripe_subscription_id = Some(subscription_id.into());
        self
    }

    pub fn with_period(mut self, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        self.period_start = start;
        self.period_end = end;
        self
    }

    pub fn with_period_end(mut self, end: Timestamp) -> Self {
        self.period_end = Some(end);
        self
    }

    pub fn with_canceled_at(mut self, canceled_at: Option<Timestamp>) -> Self {
        self.canceled_at = Some(canceled_at);
        self
    }

    pub fn with_grace_period_end(mut self, grace: Option<Timestamp>) -> Self {
        self.grace_period_end = Some(grace);
        self
    }

    pub fn with_subscription_created_at(mut self, created: Timestamp) -> Self {
        self.subscription_created_at = Some(created);
        self
    }

    pub fn observed_at(mut self, event_at: Timestamp) -> Self {
        self.last_event_at = Some(event_at);
        self
    }

    /// True when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
