//! LinkPendingSubscriptionsHandler - folds buffered subscriptions into users.
//!
//! A pending record is created when Stripe reports a subscription before the
//! platform knows who owns it. Once checkout persists the customer id (or the
//! subscription id lands on a user some other way) this job copies the
//! buffered facts onto the user and retires the record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::subscription::{PendingSubscription, SubscriptionUpdate, UserSubscription};
use crate::ports::{
    Clock, PendingSubscriptionRepository, ScheduledJob, UpdateResult, UserSubscriptionRepository,
};

/// Counters from one linking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkResult {
    pub scanned: usize,
    pub linked: usize,
    pub unmatched: usize,
    pub failed: usize,
}

pub struct LinkPendingSubscriptionsHandler {
    users: Arc<dyn UserSubscriptionRepository>,
    pending: Arc<dyn PendingSubscriptionRepository>,
    clock: Arc<dyn Clock>,
    batch_size: u32,
    interval: Duration,
}

impl LinkPendingSubscriptionsHandler {
    pub fn new(
        users: Arc<dyn UserSubscriptionRepository>,
        pending: Arc<dyn PendingSubscriptionRepository>,
        clock: Arc<dyn Clock>,
        batch_size: u32,
        interval: Duration,
    ) -> Self {
        Self {
            users,
            pending,
            clock,
            batch_size,
            interval,
        }
    }

    pub async fn handle(&self) -> Result<LinkResult, DomainError> {
        let records = self.pending.find_unprocessed(self.batch_size).await?;
        let mut result = LinkResult {
            scanned: records.len(),
            ..LinkResult::default()
        };

        for record in records {
            match self.link(record).await {
                Ok(true) => result.linked += 1,
                Ok(false) => result.unmatched += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to link pending subscription");
                    result.failed += 1;
                }
            }
        }

        if result.linked > 0 || result.failed > 0 {
            tracing::info!(
                scanned = result.scanned,
                linked = result.linked,
                failed = result.failed,
                "Pending subscription link pass finished"
            );
        }

        Ok(result)
    }

    /// Returns whether an owner was found.
    async fn link(&self, mut record: PendingSubscription) -> Result<bool, DomainError> {
        let now = self.clock.now();
        let Some(user) = self.owner_of(&record).await? else {
            return self.defer(&record, now).await;
        };

        let update = SubscriptionUpdate::link_pending(&record, &now);

        match self.users.update(&user.user_id, &update).await? {
            UpdateResult::Applied => {
                tracing::info!(
                    user_id = %user.user_id,
                    subscription_id = %record.stripe_subscription_id,
                    "Pending subscription linked to user"
                );
            }
            UpdateResult::Stale => {
                tracing::info!(
                    user_id = %user.user_id,
                    subscription_id = %record.stripe_subscription_id,
                    "User already holds newer subscription state, retiring pending record"
                );
            }
            UpdateResult::NotFound => return self.defer(&record, now).await,
        }

        self.retire(&mut record, user, now).await?;
        Ok(true)
    }

    async fn owner_of(
        &self,
        record: &PendingSubscription,
    ) -> Result<Option<UserSubscription>, DomainError> {
        if let Some(user) = self
            .users
            .find_by_stripe_subscription_id(&record.stripe_subscription_id)
            .await?
        {
            return Ok(Some(user));
        }

        match &record.stripe_customer_id {
            Some(customer_id) => self.users.find_by_stripe_customer_id(customer_id).await,
            None => Ok(None),
        }
    }

    /// Moves an unmatched record behind the ones not tried yet.
    async fn defer(
        &self,
        record: &PendingSubscription,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        self.pending
            .mark_link_attempted(&record.stripe_subscription_id, now)
            .await?;
        Ok(false)
    }

    async fn retire(
        &self,
        record: &mut PendingSubscription,
        user: UserSubscription,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        record.mark_linked(user.user_id, now);
        self.pending.upsert(record).await
    }
}

#[async_trait]
impl ScheduledJob for LinkPendingSubscriptionsHandler {
    fn name(&self) -> &'static str {
        "pending_link"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> Result<(), DomainError> {
        self.handle().await.map(|_| ())
    }
}
