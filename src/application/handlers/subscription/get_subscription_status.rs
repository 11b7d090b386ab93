//! GetSubscriptionStatusHandler - Query handler for the caller's subscription.
//!
//! Two best-effort repairs run here. With `force_refresh` the stored status is
//! overwritten with the provider's. An active subscription without a period
//! end gets one synthesized from its creation time when enabled. Failures in
//! either repair are logged and the stored view is returned.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{
    fallback_period_end, SubscriptionError, SubscriptionStatus, SubscriptionTier,
    SubscriptionUpdate, UserSubscription,
};
use crate::ports::{BillingGateway, Clock, UpdateResult, UserSubscriptionRepository};

/// Query for the caller's subscription status.
#[derive(Debug, Clone)]
pub struct GetSubscriptionStatusQuery {
    pub user_id: UserId,
    /// Re-read the status from the billing provider first.
    pub force_refresh: bool,
}

/// Presented subscription view. Unset status and tier read as `free`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSubscriptionStatusResult {
    pub status: SubscriptionStatus,
    pub tier: SubscriptionTier,
    pub period_end: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub grace_period_end: Option<Timestamp>,
}

/// Handler for subscription status queries.
pub struct GetSubscriptionStatusHandler {
    users: Arc<dyn UserSubscriptionRepository>,
    gateway: Arc<dyn BillingGateway>,
    clock: Arc<dyn Clock>,
    synthesize_missing_period_end: bool,
}

impl GetSubscriptionStatusHandler {
    pub fn new(
        users: Arc<dyn UserSubscriptionRepository>,
        gateway: Arc<dyn BillingGateway>,
        clock: Arc<dyn Clock>,
        synthesize_missing_period_end: bool,
    ) -> Self {
        Self {
            users,
            gateway,
            clock,
            synthesize_missing_period_end,
        }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionStatusQuery,
    ) -> Result<GetSubscriptionStatusResult, SubscriptionError> {
        let mut user = self
            .users
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::user_not_found(query.user_id.clone()))?;

        if query.force_refresh {
            self.refresh_status(&mut user).await;
        }

        let period_end = match user.period_end {
            Some(end) => Some(end),
            None if self.synthesize_missing_period_end
                && user.status == Some(SubscriptionStatus::Active) =>
            {
                Some(self.synthesize_period_end(&user).await)
            }
            None => None,
        };

        Ok(GetSubscriptionStatusResult {
            status: user.status_or_free(),
            tier: user.tier_or_free(),
            period_end,
            canceled_at: user.canceled_at,
            grace_period_end: user.grace_period_end,
        })
    }

    async fn refresh_status(&self, user: &mut UserSubscription) {
        let Some(subscription_id) = user.stripe_subscription_id.clone() else {
            return;
        };

        let snapshot = match self.gateway.get_subscription(&subscription_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::warn!(user_id = %user.user_id, subscription_id = %subscription_id, "Subscription not found during refresh");
                return;
            }
            Err(e) => {
                tracing::error!(user_id = %user.user_id, error = %e, "Error refreshing subscription status");
                return;
            }
        };

        let update = SubscriptionUpdate::refreshed_status(snapshot.status.clone());
        match self.users.update(&user.user_id, &update).await {
            Ok(UpdateResult::Applied) => {
                tracing::debug!(user_id = %user.user_id, status = snapshot.status.as_str(), "Subscription status refreshed");
                user.apply(&update);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(user_id = %user.user_id, error = %e, "Error saving refreshed status")
            }
        }
    }

    async fn synthesize_period_end(&self, user: &UserSubscription) -> Timestamp {
        let base = user
            .subscription_created_at
            .unwrap_or_else(|| self.clock.now());
        let period_end = fallback_period_end(base);

        tracing::warn!(
            user_id = %user.user_id,
            period_end = %period_end.to_rfc3339(),
            "Active subscription has no period end, using fallback"
        );

        let update = SubscriptionUpdate::new().with_period_end(period_end);
        if let Err(e) = self.users.update(&user.user_id, &update).await {
            tracing::error!(user_id = %user.user_id, error = %e, "Error persisting fallback period end");
        }

        period_end
    }
}
