//! CancelSubscriptionHandler - Command handler for user-initiated cancellation.
//!
//! Cancels at period end: the user keeps Pro until the sweeper demotes them
//! after `period_end`. The stored `canceled_at` follows the same rule as the
//! `customer.subscription.deleted` webhook so both paths converge.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{SubscriptionError, SubscriptionUpdate};
use crate::ports::{BillingGateway, Clock, UpdateResult, UserSubscriptionRepository};

/// Command to cancel the caller's subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

/// Result of cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSubscriptionResult {
    /// When access ends.
    pub will_end_on: Option<Timestamp>,
    pub canceled_at: Timestamp,
}

/// Handler for cancelling subscriptions.
pub struct CancelSubscriptionHandler {
    users: Arc<dyn UserSubscriptionRepository>,
    gateway: Arc<dyn BillingGateway>,
    clock: Arc<dyn Clock>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        users: Arc<dyn UserSubscriptionRepository>,
        gateway: Arc<dyn BillingGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            gateway,
            clock,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        let user = self
            .users
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::user_not_found(cmd.user_id.clone()))?;

        let subscription_id = user
            .cancellable_subscription_id()
            .ok_or_else(|| SubscriptionError::no_active_subscription(cmd.user_id.clone()))?;

        let snapshot = self
            .gateway
            .cancel_subscription(subscription_id, true)
            .await?;

        let now = self.clock.now();
        let canceled_at = snapshot.canceled_at.unwrap_or(now);
        let update = SubscriptionUpdate::subscription_canceled(snapshot.canceled_at, now);
        match self.users.update(&cmd.user_id, &update).await? {
            UpdateResult::Applied | UpdateResult::Stale => {}
            UpdateResult::NotFound => {
                // Stripe already canceled; the deleted webhook will buffer the state.
                tracing::error!(
                    user_id = %cmd.user_id,
                    subscription_id = %snapshot.id,
                    "User disappeared after billing cancellation"
                );
                return Err(SubscriptionError::user_not_found(cmd.user_id));
            }
        }

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %snapshot.id,
            "Subscription canceled at period end"
        );

        Ok(CancelSubscriptionResult {
            will_end_on: snapshot.current_period_end.or(user.period_end),
            canceled_at,
        })
    }
}
