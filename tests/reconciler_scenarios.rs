//! End-to-end reconciliation scenarios.
//!
//! Each test plays a realistic sequence of webhook deliveries, user requests
//! and scheduled job passes against one shared set of in-memory stores and
//! checks the user record that results.

use std::sync::Arc;
use std::time::Duration;

use summarizz_billing::adapters::{
    FixedClock, InMemoryPendingSubscriptionRepository, InMemoryReconcileOutbox,
    InMemoryUserSubscriptionRepository, MockBillingGateway,
};
use summarizz_billing::application::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, HandleBillingWebhookCommand,
    HandleBillingWebhookHandler, HandleBillingWebhookResult, LinkPendingSubscriptionsHandler,
    ReconcileBillingEventHandler, ReconcileOutcome, RetryFailedTransitionsHandler, RetrySettings,
    SweepExpiredSubscriptionsHandler,
};
use summarizz_billing::domain::foundation::{Timestamp, UserId};
use summarizz_billing::domain::subscription::{
    SubscriptionError, SubscriptionStatus, SubscriptionTier, UserSubscription,
};
use summarizz_billing::ports::{
    FailedTransitionStatus, GatewayError, RetryPolicy, WebhookEvent, WebhookEventData,
    WebhookEventType,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn at(rfc3339: &str) -> Timestamp {
    Timestamp::from_datetime(
        chrono::DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&chrono::Utc),
    )
}

fn uid() -> UserId {
    UserId::new("uid-1").unwrap()
}

/// Stores, gateway and clock shared by every handler in a scenario.
struct World {
    users: Arc<InMemoryUserSubscriptionRepository>,
    pending: Arc<InMemoryPendingSubscriptionRepository>,
    outbox: Arc<InMemoryReconcileOutbox>,
    gateway: MockBillingGateway,
    clock: Arc<FixedClock>,
}

impl World {
    fn new(start: &str) -> Self {
        Self {
            users: Arc::new(InMemoryUserSubscriptionRepository::new()),
            pending: Arc::new(InMemoryPendingSubscriptionRepository::new()),
            outbox: Arc::new(InMemoryReconcileOutbox::new()),
            gateway: MockBillingGateway::with_active_subscription(
                "cus_1",
                "sub_1",
                at("2025-01-01T00:00:00Z"),
                at("2025-02-01T00:00:00Z"),
            ),
            clock: Arc::new(FixedClock::new(at(start))),
        }
    }

    fn reconciler(&self) -> Arc<ReconcileBillingEventHandler> {
        Arc::new(ReconcileBillingEventHandler::new(
            self.users.clone(),
            self.pending.clone(),
            Arc::new(self.gateway.clone()),
            self.clock.clone(),
        ))
    }

    fn webhook_handler(&self) -> HandleBillingWebhookHandler {
        HandleBillingWebhookHandler::new(
            Arc::new(self.gateway.clone()),
            self.reconciler(),
            self.outbox.clone(),
            self.clock.clone(),
            RetryPolicy::new(30, 5),
            false,
        )
    }

    fn sweeper(&self) -> SweepExpiredSubscriptionsHandler {
        SweepExpiredSubscriptionsHandler::new(
            self.users.clone(),
            self.clock.clone(),
            Duration::from_secs(3600),
        )
    }

    fn linker(&self) -> LinkPendingSubscriptionsHandler {
        LinkPendingSubscriptionsHandler::new(
            self.users.clone(),
            self.pending.clone(),
            self.clock.clone(),
            100,
            Duration::from_secs(60),
        )
    }

    fn retrier(&self) -> RetryFailedTransitionsHandler {
        RetryFailedTransitionsHandler::new(
            self.outbox.clone(),
            self.reconciler(),
            self.clock.clone(),
            RetrySettings {
                policy: RetryPolicy::new(30, 5),
                batch_size: 50,
                retention_hours: 168,
                interval: Duration::from_secs(30),
            },
        )
    }

    fn canceller(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.users.clone(),
            Arc::new(self.gateway.clone()),
            self.clock.clone(),
        )
    }

    fn user(&self) -> UserSubscription {
        self.users.get(&uid()).unwrap()
    }

    async fn deliver(&self, event: &WebhookEvent) -> HandleBillingWebhookResult {
        self.webhook_handler()
            .handle(HandleBillingWebhookCommand {
                payload: stripe_payload(event),
                signature: Some("t=1,v1=sig".to_string()),
            })
            .await
            .unwrap()
    }
}

fn subscriber(status: SubscriptionStatus) -> UserSubscription {
    let mut user = UserSubscription::new(uid(), "ada@example.com");
    user.stripe_customer_id = Some("cus_1".to_string());
    user.stripe_subscription_id = Some("sub_1".to_string());
    user.status = Some(status);
    user.tier = Some(SubscriptionTier::Pro);
    user.period_start = Some(at("2025-01-01T00:00:00Z"));
    user.period_end = Some(at("2025-02-01T00:00:00Z"));
    user
}

fn subscription_event(id: &str, event_type: WebhookEventType, created: &str) -> WebhookEvent {
    WebhookEvent {
        id: id.to_string(),
        event_type,
        data: WebhookEventData::Subscription {
            subscription_id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            status: SubscriptionStatus::Active,
        },
        created_at: at(created).as_unix_secs(),
    }
}

fn payment_failed_event(created: &str) -> WebhookEvent {
    WebhookEvent {
        id: "evt_failed".to_string(),
        event_type: WebhookEventType::InvoicePaymentFailed,
        data: WebhookEventData::Invoice {
            invoice_id: "in_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
            billing_reason: Some("subscription_cycle".to_string()),
            payment_intent: None,
        },
        created_at: at(created).as_unix_secs(),
    }
}

/// Renders an event the way Stripe would deliver it.
fn stripe_payload(event: &WebhookEvent) -> Vec<u8> {
    let object = match &event.data {
        WebhookEventData::Subscription {
            subscription_id,
            customer_id,
            status,
        } => serde_json::json!({
            "id": subscription_id,
            "object": "subscription",
            "customer": customer_id,
            "status": status.as_str(),
        }),
        WebhookEventData::Invoice {
            invoice_id,
            customer_id,
            subscription_id,
            billing_reason,
            payment_intent,
        } => serde_json::json!({
            "id": invoice_id,
            "object": "invoice",
            "customer": customer_id,
            "subscription": subscription_id,
            "billing_reason": billing_reason,
            "payment_intent": payment_intent,
        }),
        WebhookEventData::Raw { json } => serde_json::from_str(json).unwrap(),
    };

    serde_json::json!({
        "id": event.id,
        "type": event.event_type.as_str(),
        "created": event.created_at,
        "data": { "object": object },
    })
    .to_string()
    .into_bytes()
}

// =============================================================================
// Payment failure and grace period
// =============================================================================

#[tokio::test]
async fn failed_payment_is_demoted_only_after_grace() {
    let world = World::new("2025-01-02T00:00:00Z");
    world.users.insert(subscriber(SubscriptionStatus::Active));

    let result = world.deliver(&payment_failed_event("2025-01-02T00:00:00Z")).await;
    assert_eq!(
        result,
        HandleBillingWebhookResult::Reconciled(ReconcileOutcome::AppliedToUser { user_id: uid() })
    );

    let user = world.user();
    assert_eq!(user.status, Some(SubscriptionStatus::PastDue));
    assert_eq!(user.tier, Some(SubscriptionTier::Pro));
    assert_eq!(user.grace_period_end, Some(at("2025-01-09T00:00:00Z")));

    // The grace window is still open at its exact end
    world.clock.set(at("2025-01-09T00:00:00Z"));
    let sweep = world.sweeper().handle().await.unwrap();
    assert_eq!(sweep.demoted, 0);
    assert_eq!(world.user().tier, Some(SubscriptionTier::Pro));

    world.clock.set(at("2025-01-10T00:00:00Z"));
    let sweep = world.sweeper().handle().await.unwrap();
    assert_eq!(sweep.demoted, 1);

    let user = world.user();
    assert_eq!(user.tier, Some(SubscriptionTier::Free));
    assert_eq!(user.status, Some(SubscriptionStatus::Canceled));
}

#[tokio::test]
async fn recovered_payment_survives_the_sweep() {
    let world = World::new("2025-01-02T00:00:00Z");
    world.users.insert(subscriber(SubscriptionStatus::Active));

    world.deliver(&payment_failed_event("2025-01-02T00:00:00Z")).await;

    // Retry succeeds two days later and Stripe reports the subscription active
    world.clock.set(at("2025-01-04T00:00:00Z"));
    world
        .deliver(&subscription_event(
            "evt_updated",
            WebhookEventType::SubscriptionUpdated,
            "2025-01-04T00:00:00Z",
        ))
        .await;
    assert_eq!(world.user().status, Some(SubscriptionStatus::Active));

    world.clock.set(at("2025-01-10T00:00:00Z"));
    let sweep = world.sweeper().handle().await.unwrap();

    assert_eq!(sweep.demoted, 0);
    assert_eq!(world.user().tier, Some(SubscriptionTier::Pro));
}

// =============================================================================
// Buffering and link-back
// =============================================================================

#[tokio::test]
async fn subscription_seen_before_its_owner_is_linked_later() {
    let world = World::new("2025-01-01T00:00:00Z");
    // Checkout has not yet written the customer id
    world.users.insert(UserSubscription::new(uid(), "ada@example.com"));

    let result = world
        .deliver(&subscription_event(
            "evt_created",
            WebhookEventType::SubscriptionCreated,
            "2025-01-01T00:00:00Z",
        ))
        .await;
    assert_eq!(
        result,
        HandleBillingWebhookResult::Reconciled(ReconcileOutcome::Buffered {
            subscription_id: "sub_1".to_string()
        })
    );
    assert_eq!(world.user().status, None);

    // Nothing to link while the owner is unknown
    let first = world.linker().handle().await.unwrap();
    assert_eq!(first.unmatched, 1);

    let mut user = world.user();
    user.stripe_customer_id = Some("cus_1".to_string());
    world.users.insert(user);

    world.clock.set(at("2025-01-01T00:01:00Z"));
    let second = world.linker().handle().await.unwrap();
    assert_eq!(second.linked, 1);

    let user = world.user();
    assert_eq!(user.stripe_subscription_id.as_deref(), Some("sub_1"));
    assert_eq!(user.status, Some(SubscriptionStatus::Active));
    assert_eq!(user.tier, Some(SubscriptionTier::Pro));
    assert_eq!(user.period_end, Some(at("2025-02-01T00:00:00Z")));

    let record = world.pending.get("sub_1").unwrap();
    assert!(record.processed);
    assert_eq!(record.linked_user_id, Some(uid()));
}

#[tokio::test]
async fn events_after_linking_reach_the_user_directly() {
    let world = World::new("2025-01-01T00:00:00Z");
    world.users.insert(UserSubscription::new(uid(), "ada@example.com"));

    world
        .deliver(&subscription_event(
            "evt_created",
            WebhookEventType::SubscriptionCreated,
            "2025-01-01T00:00:00Z",
        ))
        .await;
    let mut user = world.user();
    user.stripe_customer_id = Some("cus_1".to_string());
    world.users.insert(user);
    world.linker().handle().await.unwrap();

    world.clock.set(at("2025-01-05T00:00:00Z"));
    let result = world.deliver(&payment_failed_event("2025-01-05T00:00:00Z")).await;

    assert_eq!(
        result,
        HandleBillingWebhookResult::Reconciled(ReconcileOutcome::AppliedToUser { user_id: uid() })
    );
    assert_eq!(world.user().status, Some(SubscriptionStatus::PastDue));
    assert_eq!(world.pending.len(), 1);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn user_cancel_and_deletion_webhook_agree() {
    let world = World::new("2025-01-15T00:00:00Z");
    world.users.insert(subscriber(SubscriptionStatus::Active));
    world.gateway.set_cancel_time(at("2025-01-14T23:59:00Z"));

    let cancel = world
        .canceller()
        .handle(CancelSubscriptionCommand { user_id: uid() })
        .await
        .unwrap();
    assert_eq!(cancel.will_end_on, Some(at("2025-02-01T00:00:00Z")));

    let after_request = world.user();
    assert_eq!(after_request.status, Some(SubscriptionStatus::Canceled));
    assert_eq!(after_request.tier, Some(SubscriptionTier::Pro));

    // Stripe deletes the subscription when the period runs out
    world.clock.set(at("2025-02-01T00:00:05Z"));
    world
        .deliver(&subscription_event(
            "evt_deleted",
            WebhookEventType::SubscriptionDeleted,
            "2025-02-01T00:00:00Z",
        ))
        .await;

    let after_webhook = world.user();
    assert_eq!(after_webhook.status, Some(SubscriptionStatus::Canceled));
    assert_eq!(after_webhook.canceled_at, after_request.canceled_at);
    assert_eq!(after_webhook.canceled_at, Some(at("2025-01-14T23:59:00Z")));

    world.clock.set(at("2025-02-02T00:00:00Z"));
    world.sweeper().handle().await.unwrap();
    assert_eq!(world.user().tier, Some(SubscriptionTier::Free));
}

#[tokio::test]
async fn cancel_after_deletion_is_refused() {
    let world = World::new("2025-01-15T00:00:00Z");
    world.users.insert(subscriber(SubscriptionStatus::Active));

    world
        .deliver(&subscription_event(
            "evt_deleted",
            WebhookEventType::SubscriptionDeleted,
            "2025-01-15T00:00:00Z",
        ))
        .await;

    let err = world
        .canceller()
        .handle(CancelSubscriptionCommand { user_id: uid() })
        .await
        .unwrap_err();

    assert!(matches!(err, SubscriptionError::NoActiveSubscription(_)));
    assert!(!world.gateway.was_called("cancel_subscription"));
}

// =============================================================================
// Ordering and idempotency
// =============================================================================

#[tokio::test]
async fn redelivered_event_converges_to_the_same_record() {
    let world = World::new("2025-01-03T00:00:00Z");
    world.users.insert(subscriber(SubscriptionStatus::PastDue));
    let event = subscription_event(
        "evt_updated",
        WebhookEventType::SubscriptionUpdated,
        "2025-01-03T00:00:00Z",
    );

    world.deliver(&event).await;
    let once = world.user();
    world.deliver(&event).await;

    assert_eq!(world.user(), once);
    assert_eq!(once.status, Some(SubscriptionStatus::Active));
    assert_eq!(once.last_event_at, Some(at("2025-01-03T00:00:00Z")));
}

#[tokio::test]
async fn late_arriving_older_event_is_skipped() {
    let world = World::new("2025-01-06T00:00:00Z");
    world.users.insert(subscriber(SubscriptionStatus::Active));

    world
        .deliver(&subscription_event(
            "evt_updated",
            WebhookEventType::SubscriptionUpdated,
            "2025-01-05T00:00:00Z",
        ))
        .await;
    let result = world.deliver(&payment_failed_event("2025-01-04T00:00:00Z")).await;

    assert_eq!(
        result,
        HandleBillingWebhookResult::Reconciled(ReconcileOutcome::Stale)
    );
    let user = world.user();
    assert_eq!(user.status, Some(SubscriptionStatus::Active));
    assert_eq!(user.grace_period_end, None);
}

// =============================================================================
// Retry outbox
// =============================================================================

#[tokio::test]
async fn failed_reconcile_is_resolved_by_the_retry_job() {
    let world = World::new("2025-01-03T00:00:00Z");
    world.users.insert(subscriber(SubscriptionStatus::PastDue));
    world
        .gateway
        .set_method_error("get_subscription", GatewayError::network("timeout"));

    let result = world
        .deliver(&subscription_event(
            "evt_updated",
            WebhookEventType::SubscriptionUpdated,
            "2025-01-03T00:00:00Z",
        ))
        .await;
    assert_eq!(result, HandleBillingWebhookResult::Deferred);
    assert_eq!(world.user().status, Some(SubscriptionStatus::PastDue));

    // Not due before the backoff elapses
    let early = world.retrier().handle().await.unwrap();
    assert_eq!(early.due, 0);

    world.gateway.clear_errors();
    world.clock.set(at("2025-01-03T00:01:00Z"));
    let retry = world.retrier().handle().await.unwrap();

    assert_eq!(retry.resolved, 1);
    assert_eq!(world.user().status, Some(SubscriptionStatus::Active));
    assert_eq!(world.outbox.entries()[0].status, FailedTransitionStatus::Resolved);
}

#[tokio::test]
async fn persistent_failure_is_abandoned_after_max_attempts() {
    let world = World::new("2025-01-03T00:00:00Z");
    world.users.insert(subscriber(SubscriptionStatus::PastDue));
    world
        .gateway
        .set_method_error("get_subscription", GatewayError::network("timeout"));

    world
        .deliver(&subscription_event(
            "evt_updated",
            WebhookEventType::SubscriptionUpdated,
            "2025-01-03T00:00:00Z",
        ))
        .await;

    for _ in 0..6 {
        world.clock.advance_days(1);
        world.retrier().handle().await.unwrap();
    }

    let entry = &world.outbox.entries()[0];
    assert_eq!(entry.status, FailedTransitionStatus::Abandoned);
    assert_eq!(entry.attempts, 5);
    assert_eq!(world.user().status, Some(SubscriptionStatus::PastDue));
}
