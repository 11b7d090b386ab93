//! ReconcileBillingEventHandler - applies a verified billing event to stored state.
//!
//! Subscription events re-read the live subscription from the gateway and
//! overwrite the owner's fields with what the provider reports. Events whose
//! owner is unknown are buffered as pending records, keyed by subscription id,
//! until the pending linker can attach them to a user.
//!
//! Every patch carries the event's `created` time; stores refuse patches older
//! than the newest one they have seen, so redelivered or reordered events
//! never roll a record back.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{PendingSubscription, SubscriptionError, SubscriptionUpdate};
use crate::ports::{
    BillingGateway, Clock, PendingSubscriptionRepository, SubscriptionSnapshot, UpdateResult,
    UserSubscriptionRepository, WebhookEvent, WebhookEventData, WebhookEventType,
};

/// Invoice `billing_reason` for the first invoice of a new subscription.
const BILLING_REASON_SUBSCRIPTION_CREATE: &str = "subscription_create";

/// What reconciling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The owning user's record was updated.
    AppliedToUser { user_id: UserId },
    /// No owner yet; the facts were stored in the pending buffer.
    Buffered { subscription_id: String },
    /// The target already reflects a newer event.
    Stale,
    /// Informational event, logged only.
    Logged,
    /// Nothing to do for this event.
    Ignored,
}

/// Handler reconciling billing webhook events.
pub struct ReconcileBillingEventHandler {
    users: Arc<dyn UserSubscriptionRepository>,
    pending: Arc<dyn PendingSubscriptionRepository>,
    gateway: Arc<dyn BillingGateway>,
    clock: Arc<dyn Clock>,
}

impl ReconcileBillingEventHandler {
    pub fn new(
        users: Arc<dyn UserSubscriptionRepository>,
        pending: Arc<dyn PendingSubscriptionRepository>,
        gateway: Arc<dyn BillingGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            pending,
            gateway,
            clock,
        }
    }

    pub async fn handle(&self, event: &WebhookEvent) -> Result<ReconcileOutcome, SubscriptionError> {
        let now = self.clock.now();
        let event_at = event.occurred_at().unwrap_or(now);

        tracing::debug!(
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            "Reconciling billing event"
        );

        match &event.event_type {
            WebhookEventType::SubscriptionCreated => {
                self.subscription_created(event, event_at, now).await
            }
            WebhookEventType::SubscriptionUpdated => match subscription_id_of(event) {
                Some(subscription_id) => {
                    self.subscription_updated(&subscription_id, event_at, now).await
                }
                None => Ok(unexpected_payload(event)),
            },
            WebhookEventType::SubscriptionDeleted => {
                self.subscription_deleted(event, event_at, now).await
            }
            WebhookEventType::InvoicePaymentFailed => {
                self.payment_failed(event, event_at, now).await
            }
            WebhookEventType::InvoicePaymentSucceeded => {
                self.payment_succeeded(event, event_at, now).await
            }
            WebhookEventType::TrialWillEnd => {
                let subscription_id = subscription_id_of(event).unwrap_or_default();
                tracing::info!(
                    event_id = %event.id,
                    subscription_id = %subscription_id,
                    "Trial will end soon for subscription"
                );
                Ok(ReconcileOutcome::Logged)
            }
            WebhookEventType::Unknown(event_type) => {
                tracing::debug!(event_id = %event.id, event_type = %event_type, "Ignoring billing event");
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }

    async fn subscription_created(
        &self,
        event: &WebhookEvent,
        event_at: Timestamp,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let WebhookEventData::Subscription { subscription_id, .. } = &event.data else {
            return Ok(unexpected_payload(event));
        };
        let Some(snapshot) = self.snapshot(subscription_id).await? else {
            return Ok(ReconcileOutcome::Ignored);
        };

        let update = SubscriptionUpdate::subscription_created(
            snapshot.id.clone(),
            snapshot.status.clone(),
            snapshot.current_period_start,
            snapshot.current_period_end,
        )
        .with_subscription_created_at(event_at)
        .observed_at(event_at);

        match self
            .users
            .find_by_stripe_customer_id(&snapshot.customer_id)
            .await?
        {
            Some(user) => self.apply_to_user(user.user_id, &update, &snapshot, now).await,
            None => {
                tracing::warn!(
                    subscription_id = %snapshot.id,
                    customer_id = %snapshot.customer_id,
                    "No user owns billing customer, buffering subscription"
                );
                self.buffer(&snapshot.id, Some(&snapshot.customer_id), &update, now)
                    .await
            }
        }
    }

    async fn subscription_updated(
        &self,
        subscription_id: &str,
        event_at: Timestamp,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let Some(snapshot) = self.snapshot(subscription_id).await? else {
            return Ok(ReconcileOutcome::Ignored);
        };

        let update = SubscriptionUpdate::subscription_updated(
            snapshot.status.clone(),
            snapshot.current_period_start,
            snapshot.current_period_end,
        )
        .observed_at(event_at);

        self.apply_by_subscription_id(&snapshot, &update, &update, now)
            .await
    }

    async fn subscription_deleted(
        &self,
        event: &WebhookEvent,
        event_at: Timestamp,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let Some(subscription_id) = subscription_id_of(event) else {
            return Ok(unexpected_payload(event));
        };
        let Some(snapshot) = self.snapshot(&subscription_id).await? else {
            return Ok(ReconcileOutcome::Ignored);
        };

        let update =
            SubscriptionUpdate::subscription_canceled(snapshot.canceled_at, now).observed_at(event_at);

        let mut buffered = update.clone();
        if let Some(end) = snapshot.current_period_end {
            buffered = buffered.with_period_end(end);
        }

        self.apply_by_subscription_id(&snapshot, &update, &buffered, now)
            .await
    }

    async fn payment_failed(
        &self,
        event: &WebhookEvent,
        event_at: Timestamp,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let WebhookEventData::Invoice {
            subscription_id,
            customer_id,
            ..
        } = &event.data
        else {
            return Ok(unexpected_payload(event));
        };
        let Some(subscription_id) = subscription_id else {
            tracing::debug!(event_id = %event.id, "Failed invoice has no subscription");
            return Ok(ReconcileOutcome::Ignored);
        };

        let update = SubscriptionUpdate::payment_failed(now).observed_at(event_at);

        if let Some(user) = self
            .users
            .find_by_stripe_subscription_id(subscription_id)
            .await?
        {
            return self.write_user(user.user_id, &update).await;
        }

        tracing::warn!(
            subscription_id = %subscription_id,
            "No user owns subscription for failed payment, buffering"
        );
        self.buffer(subscription_id, customer_id.as_deref(), &update, now)
            .await
    }

    async fn payment_succeeded(
        &self,
        event: &WebhookEvent,
        event_at: Timestamp,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let WebhookEventData::Invoice {
            subscription_id,
            billing_reason,
            payment_intent,
            ..
        } = &event.data
        else {
            return Ok(unexpected_payload(event));
        };
        let Some(subscription_id) = subscription_id else {
            tracing::debug!(event_id = %event.id, "Paid invoice has no subscription");
            return Ok(ReconcileOutcome::Ignored);
        };

        if billing_reason.as_deref() == Some(BILLING_REASON_SUBSCRIPTION_CREATE) {
            if let Some(payment_intent_id) = payment_intent {
                self.set_default_payment_method(subscription_id, payment_intent_id)
                    .await;
            }
        }

        self.subscription_updated(subscription_id, event_at, now).await
    }

    /// Failures are logged; the subsequent refresh still runs.
    async fn set_default_payment_method(&self, subscription_id: &str, payment_intent_id: &str) {
        let intent = match self.gateway.get_payment_intent(payment_intent_id).await {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                tracing::warn!(payment_intent_id, "Payment intent not found");
                return;
            }
            Err(e) => {
                tracing::error!(payment_intent_id, error = %e, "Error fetching payment intent");
                return;
            }
        };

        let Some(payment_method) = intent.payment_method else {
            return;
        };

        match self
            .gateway
            .update_subscription_default_payment_method(subscription_id, &payment_method)
            .await
        {
            Ok(_) => {
                tracing::info!(subscription_id, "Default payment method set for subscription")
            }
            Err(e) => {
                tracing::error!(subscription_id, error = %e, "Error setting default payment method")
            }
        }
    }

    async fn snapshot(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, SubscriptionError> {
        let snapshot = self.gateway.get_subscription(subscription_id).await?;
        if snapshot.is_none() {
            tracing::warn!(subscription_id, "Billing provider does not know subscription, skipping");
        }
        Ok(snapshot)
    }

    /// User by subscription id first, then the pending buffer.
    async fn apply_by_subscription_id(
        &self,
        snapshot: &SubscriptionSnapshot,
        user_update: &SubscriptionUpdate,
        pending_update: &SubscriptionUpdate,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        match self
            .users
            .find_by_stripe_subscription_id(&snapshot.id)
            .await?
        {
            Some(user) => self.apply_to_user(user.user_id, user_update, snapshot, now).await,
            None => {
                tracing::warn!(
                    subscription_id = %snapshot.id,
                    "No user owns subscription, buffering"
                );
                self.buffer(&snapshot.id, Some(&snapshot.customer_id), pending_update, now)
                    .await
            }
        }
    }

    async fn apply_to_user(
        &self,
        user_id: UserId,
        update: &SubscriptionUpdate,
        snapshot: &SubscriptionSnapshot,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        match self.users.update(&user_id, update).await? {
            UpdateResult::Applied => {
                tracing::info!(user_id = %user_id, subscription_id = %snapshot.id, "Subscription reconciled");
                Ok(ReconcileOutcome::AppliedToUser { user_id })
            }
            UpdateResult::Stale => {
                tracing::info!(user_id = %user_id, subscription_id = %snapshot.id, "Skipping stale event");
                Ok(ReconcileOutcome::Stale)
            }
            UpdateResult::NotFound => {
                tracing::warn!(user_id = %user_id, "User disappeared during reconcile, buffering");
                self.buffer(&snapshot.id, Some(&snapshot.customer_id), update, now)
                    .await
            }
        }
    }

    async fn write_user(
        &self,
        user_id: UserId,
        update: &SubscriptionUpdate,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        match self.users.update(&user_id, update).await? {
            UpdateResult::Applied => Ok(ReconcileOutcome::AppliedToUser { user_id }),
            UpdateResult::Stale => {
                tracing::info!(user_id = %user_id, "Skipping stale event");
                Ok(ReconcileOutcome::Stale)
            }
            UpdateResult::NotFound => Err(SubscriptionError::user_not_found(user_id)),
        }
    }

    /// Upsert the pending record for `subscription_id`.
    ///
    /// A record already folded into a user forwards the update to that user
    /// instead of coming back to life.
    async fn buffer(
        &self,
        subscription_id: &str,
        customer_id: Option<&str>,
        update: &SubscriptionUpdate,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let existing = self.pending.find(subscription_id).await?;

        if let Some(record) = &existing {
            if let (true, Some(user_id)) = (record.processed, record.linked_user_id.clone()) {
                return self.write_user(user_id, update).await;
            }
            if let Some(event_at) = &update.last_event_at {
                if !record.accepts_event_at(event_at) {
                    tracing::info!(subscription_id, "Skipping stale event for pending subscription");
                    return Ok(ReconcileOutcome::Stale);
                }
            }
        }

        let mut record = existing.unwrap_or_else(|| {
            PendingSubscription::new(subscription_id, customer_id.map(str::to_string), now)
        });
        if record.stripe_customer_id.is_none() {
            record.stripe_customer_id = customer_id.map(str::to_string);
        }
        record.apply(update, now);
        self.pending.upsert(&record).await?;

        Ok(ReconcileOutcome::Buffered {
            subscription_id: subscription_id.to_string(),
        })
    }
}

fn subscription_id_of(event: &WebhookEvent) -> Option<String> {
    match &event.data {
        WebhookEventData::Subscription {
            subscription_id, ..
        } => Some(subscription_id.clone()),
        WebhookEventData::Invoice {
            subscription_id, ..
        } => subscription_id.clone(),
        WebhookEventData::Raw { .. } => None,
    }
}

fn unexpected_payload(event: &WebhookEvent) -> ReconcileOutcome {
    tracing::warn!(
        event_id = %event.id,
        event_type = event.event_type.as_str(),
        "Unexpected payload for billing event, ignoring"
    );
    ReconcileOutcome::Ignored
}
