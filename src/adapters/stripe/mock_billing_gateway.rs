//! Mock billing gateway for testing.
//!
//! Configurable in-process implementation of `BillingGateway` for unit and
//! integration tests. Supports:
//! - Seeded subscriptions and payment intents
//! - Error injection per method
//! - Call tracking
//! - Webhook acceptance modes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::{
    BillingGateway, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer,
    GatewayError, PaymentIntent, SubscriptionSnapshot, WebhookEvent,
};

use super::stripe_gateway::decode_event;

/// Mock billing gateway.
///
/// # Example
///
/// ```ignore
/// let gateway = MockBillingGateway::new();
/// gateway.add_subscription(snapshot);
/// gateway.set_method_error("get_subscription", GatewayError::network("down"));
/// ```
#[derive(Default, Clone)]
pub struct MockBillingGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    subscriptions: HashMap<String, SubscriptionSnapshot>,
    payment_intents: HashMap<String, PaymentIntent>,
    next_customer_id: Option<String>,
    cancel_time: Option<Timestamp>,
    method_errors: HashMap<String, GatewayError>,
    call_log: Vec<MethodCall>,
    webhook_mode: WebhookMode,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

/// How `verify_webhook` treats signatures.
#[derive(Default, Clone)]
enum WebhookMode {
    /// Any signature is accepted; the body is decoded as a Stripe event.
    #[default]
    AcceptAll,

    /// Only this exact signature is accepted.
    RequireSignature(String),

    /// Every verification fails.
    AlwaysFail,
}

impl MockBillingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that only accepts `signature`.
    pub fn requiring_signature(signature: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.inner.lock().unwrap().webhook_mode = WebhookMode::RequireSignature(signature.into());
        mock
    }

    /// A gateway that fails every webhook verification.
    pub fn rejecting_webhooks() -> Self {
        let mock = Self::new();
        mock.inner.lock().unwrap().webhook_mode = WebhookMode::AlwaysFail;
        mock
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════════════════════════════════════

    /// Seed or replace a subscription the provider knows about.
    pub fn add_subscription(&self, subscription: SubscriptionSnapshot) {
        let id = subscription.id.clone();
        self.inner.lock().unwrap().subscriptions.insert(id, subscription);
    }

    pub fn add_payment_intent(&self, intent: PaymentIntent) {
        let id = intent.id.clone();
        self.inner.lock().unwrap().payment_intents.insert(id, intent);
    }

    /// Id returned by the next `create_customer`.
    pub fn set_next_customer_id(&self, id: impl Into<String>) {
        self.inner.lock().unwrap().next_customer_id = Some(id.into());
    }

    /// `canceled_at` stamped by `cancel_subscription` (defaults to now).
    pub fn set_cancel_time(&self, at: Timestamp) {
        self.inner.lock().unwrap().cancel_time = Some(at);
    }

    /// Make `method` fail until cleared.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.inner
            .lock()
            .unwrap()
            .method_errors
            .insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        self.inner.lock().unwrap().method_errors.clear();
    }

    /// Current provider-side state of a subscription.
    pub fn subscription(&self, id: &str) -> Option<SubscriptionSnapshot> {
        self.inner.lock().unwrap().subscriptions.get(id).cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    fn record_call(&self, method: &str, args: Vec<String>) -> Result<(), GatewayError> {
        let mut state = self.inner.lock().unwrap();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        match state.method_errors.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BillingGateway for MockBillingGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError> {
        self.record_call(
            "create_customer",
            vec![
                request.user_id.to_string(),
                request.email.clone(),
                request.name.clone().unwrap_or_default(),
            ],
        )?;

        let id = self
            .inner
            .lock()
            .unwrap()
            .next_customer_id
            .take()
            .unwrap_or_else(|| format!("cus_mock_{}", request.user_id));

        Ok(Customer {
            id,
            email: request.email,
            name: request.name,
        })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.record_call(
            "create_checkout_session",
            vec![
                request.customer_id.clone(),
                request.price_id,
                request.success_url,
                request.cancel_url,
            ],
        )?;

        Ok(CheckoutSession {
            id: format!("cs_mock_{}", request.customer_id),
            url: format!("https://checkout.stripe.com/c/pay/cs_mock_{}", request.customer_id),
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError> {
        self.record_call("get_subscription", vec![subscription_id.to_string()])?;
        Ok(self.subscription(subscription_id))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.record_call(
            "cancel_subscription",
            vec![subscription_id.to_string(), at_period_end.to_string()],
        )?;

        let mut state = self.inner.lock().unwrap();
        let cancel_time = state.cancel_time.unwrap_or_else(Timestamp::now);
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| GatewayError::not_found("Subscription"))?;

        subscription.cancel_at_period_end = at_period_end;
        subscription.canceled_at.get_or_insert(cancel_time);
        if !at_period_end {
            subscription.status = SubscriptionStatus::Canceled;
        }

        Ok(subscription.clone())
    }

    async fn get_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntent>, GatewayError> {
        self.record_call("get_payment_intent", vec![payment_intent_id.to_string()])?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payment_intents
            .get(payment_intent_id)
            .cloned())
    }

    async fn update_subscription_default_payment_method(
        &self,
        subscription_id: &str,
        payment_method_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.record_call(
            "update_subscription_default_payment_method",
            vec![subscription_id.to_string(), payment_method_id.to_string()],
        )?;
        self.subscription(subscription_id)
            .ok_or_else(|| GatewayError::not_found("Subscription"))
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatewayError> {
        self.record_call("verify_webhook", vec![signature.to_string()])?;

        let mode = self.inner.lock().unwrap().webhook_mode.clone();
        match mode {
            WebhookMode::AcceptAll => {}
            WebhookMode::RequireSignature(required) if required == signature => {}
            WebhookMode::RequireSignature(_) => {
                return Err(GatewayError::invalid_webhook(
                    "No signatures found matching the expected signature for payload",
                ));
            }
            WebhookMode::AlwaysFail => {
                return Err(GatewayError::invalid_webhook("Verification disabled"));
            }
        }

        decode_event(payload).map(|(_, event)| event)
    }

    fn parse_unsigned_webhook(&self, payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
        self.record_call("parse_unsigned_webhook", vec![])?;
        decode_event(payload).map(|(_, event)| event)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Test Helpers
// ════════════════════════════════════════════════════════════════════════════════

impl MockBillingGateway {
    /// A gateway that knows one active subscription.
    pub fn with_active_subscription(
        customer_id: &str,
        subscription_id: &str,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> Self {
        let mock = Self::new();
        mock.add_subscription(SubscriptionSnapshot {
            id: subscription_id.to_string(),
            customer_id: customer_id.to_string(),
            status: SubscriptionStatus::Active,
            current_period_start: Some(period_start),
            current_period_end: Some(period_end),
            cancel_at_period_end: false,
            canceled_at: None,
        });
        mock
    }
}
