//! Billing gateway port for the external subscription provider.
//!
//! Defines the contract the reconciler and the user-facing commands use to
//! talk to the billing provider (Stripe in production). The gateway is always
//! injected as `Arc<dyn BillingGateway>`; there is no process-global client.
//!
//! # Design
//!
//! - **Provider truth**: subscription state is read back from the provider
//!   instead of trusted from webhook payloads
//! - **No retries**: failures surface as `GatewayError` with a `retryable` hint
//!   and the caller decides (the webhook path parks them in the retry outbox)

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{SubscriptionError, SubscriptionStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Port for billing provider integrations.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Create a customer in the billing system.
    async fn create_customer(&self, request: CreateCustomerRequest)
        -> Result<Customer, GatewayError>;

    /// Create a hosted checkout session for the configured price.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Fetch the live subscription. `None` when the provider does not know it.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError>;

    /// Cancel a subscription.
    ///
    /// If `at_period_end` is true, access continues until the period ends.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, GatewayError>;

    /// Fetch a payment intent. `None` when it does not exist.
    async fn get_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntent>, GatewayError>;

    /// Make a payment method the subscription's default for future invoices.
    async fn update_subscription_default_payment_method(
        &self,
        subscription_id: &str,
        payment_method_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError>;

    /// Verify a webhook signature and parse the event.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatewayError>;

    /// Parse a webhook body without verifying it.
    ///
    /// Only for test mode, when the request carried no signature header.
    fn parse_unsigned_webhook(&self, payload: &[u8]) -> Result<WebhookEvent, GatewayError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Internal user ID (stored as metadata).
    pub user_id: UserId,

    /// Customer email address.
    pub email: String,

    /// Display name, when the user has one.
    pub name: Option<String>,
}

/// Customer in the billing system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Provider's customer ID.
    pub id: String,

    pub email: String,

    pub name: Option<String>,
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Provider's customer ID.
    pub customer_id: String,

    /// Recurring price to subscribe to.
    pub price_id: String,

    /// Redirect after successful checkout.
    pub success_url: String,

    /// Redirect after abandoned checkout.
    pub cancel_url: String,
}

/// Checkout session for payment completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID.
    pub id: String,

    /// URL for the customer to complete checkout.
    pub url: String,
}

/// Live subscription state as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub id: String,

    pub customer_id: String,

    /// Provider status, passed through verbatim.
    pub status: SubscriptionStatus,

    pub current_period_start: Option<Timestamp>,

    pub current_period_end: Option<Timestamp>,

    /// Whether the subscription cancels when the period ends.
    pub cancel_at_period_end: bool,

    /// When cancellation was requested, if it was.
    pub canceled_at: Option<Timestamp>,
}

/// Payment intent, reduced to what the first-invoice flow needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,

    /// Payment method used, if one was attached.
    pub payment_method: Option<String>,
}

/// Webhook event from the billing provider.
///
/// Serializable so failed transitions can be stored and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID from provider.
    pub id: String,

    pub event_type: WebhookEventType,

    pub data: WebhookEventData,

    /// When the provider created the event (Unix seconds).
    pub created_at: i64,
}

impl WebhookEvent {
    /// Provider creation time, used to order transitions.
    ///
    /// `None` when the provider did not stamp the event.
    pub fn occurred_at(&self) -> Option<Timestamp> {
        if self.created_at <= 0 {
            return None;
        }
        Timestamp::from_unix_secs(self.created_at)
    }
}

/// Types of webhook events the reconciler distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    /// `customer.subscription.created`
    SubscriptionCreated,

    /// `customer.subscription.updated`
    SubscriptionUpdated,

    /// `customer.subscription.deleted`
    SubscriptionDeleted,

    /// `customer.subscription.trial_will_end`
    TrialWillEnd,

    /// `invoice.payment_succeeded`
    InvoicePaymentSucceeded,

    /// `invoice.payment_failed`
    InvoicePaymentFailed,

    /// Any other provider event type.
    Unknown(String),
}

impl WebhookEventType {
    /// Map a provider event type string.
    pub fn from_provider(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.created" => WebhookEventType::SubscriptionCreated,
            "customer.subscription.updated" => WebhookEventType::SubscriptionUpdated,
            "customer.subscription.deleted" => WebhookEventType::SubscriptionDeleted,
            "customer.subscription.trial_will_end" => WebhookEventType::TrialWillEnd,
            "invoice.payment_succeeded" => WebhookEventType::InvoicePaymentSucceeded,
            "invoice.payment_failed" => WebhookEventType::InvoicePaymentFailed,
            other => WebhookEventType::Unknown(other.to_string()),
        }
    }

    /// Provider event type string.
    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventType::SubscriptionCreated => "customer.subscription.created",
            WebhookEventType::SubscriptionUpdated => "customer.subscription.updated",
            WebhookEventType::SubscriptionDeleted => "customer.subscription.deleted",
            WebhookEventType::TrialWillEnd => "customer.subscription.trial_will_end",
            WebhookEventType::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            WebhookEventType::InvoicePaymentFailed => "invoice.payment_failed",
            WebhookEventType::Unknown(s) => s,
        }
    }
}

/// Webhook event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookEventData {
    /// Subscription object.
    #[serde(rename = "subscription")]
    Subscription {
        subscription_id: String,
        customer_id: String,
        status: SubscriptionStatus,
    },

    /// Invoice object.
    #[serde(rename = "invoice")]
    Invoice {
        invoice_id: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        billing_reason: Option<String>,
        payment_intent: Option<String>,
    },

    /// Raw/unknown event data.
    #[serde(rename = "raw")]
    Raw { json: String },
}

/// Errors from billing gateway operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: GatewayErrorCode,

    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::AuthenticationError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(GatewayErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidWebhook, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for SubscriptionError {
    fn from(err: GatewayError) -> Self {
        match err.code {
            GatewayErrorCode::InvalidWebhook => SubscriptionError::InvalidWebhook(err.message),
            _ => SubscriptionError::gateway(err.to_string(), err.retryable),
        }
    }
}

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    NetworkError,
    AuthenticationError,
    NotFound,
    RateLimitExceeded,
    InvalidWebhook,
    ProviderError,
    Unknown,
}

impl GatewayErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::NetworkError
                | GatewayErrorCode::RateLimitExceeded
                | GatewayErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            GatewayErrorCode::InvalidWebhook => "invalid_webhook",
            GatewayErrorCode::ProviderError => "provider_error",
            GatewayErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn BillingGateway) {}
    }

    #[test]
    fn event_type_round_trips_provider_strings() {
        for raw in [
            "customer.subscription.created",
            "customer.subscription.updated",
            "customer.subscription.deleted",
            "customer.subscription.trial_will_end",
            "invoice.payment_succeeded",
            "invoice.payment_failed",
            "charge.refunded",
        ] {
            assert_eq!(WebhookEventType::from_provider(raw).as_str(), raw);
        }
        assert_eq!(
            WebhookEventType::from_provider("charge.refunded"),
            WebhookEventType::Unknown("charge.refunded".to_string())
        );
    }

    #[test]
    fn webhook_event_survives_json_storage() {
        let event = WebhookEvent {
            id: "evt_1".to_string(),
            event_type: WebhookEventType::SubscriptionUpdated,
            data: WebhookEventData::Subscription {
                subscription_id: "sub_1".to_string(),
                customer_id: "cus_1".to_string(),
                status: SubscriptionStatus::Other("trialing".to_string()),
            },
            created_at: 1_735_776_000,
        };

        let json = serde_json::to_value(&event).unwrap();
        let restored: WebhookEvent = serde_json::from_value(json).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn occurred_at_reads_unix_seconds() {
        let event = WebhookEvent {
            id: "evt_1".to_string(),
            event_type: WebhookEventType::TrialWillEnd,
            data: WebhookEventData::Raw { json: "{}".to_string() },
            created_at: 1_735_776_000,
        };
        assert_eq!(
            event.occurred_at().unwrap().to_rfc3339(),
            "2025-01-02T00:00:00.000Z"
        );
    }

    #[test]
    fn gateway_error_retryable() {
        assert!(GatewayErrorCode::NetworkError.is_retryable());
        assert!(GatewayErrorCode::RateLimitExceeded.is_retryable());
        assert!(!GatewayErrorCode::InvalidWebhook.is_retryable());
        assert!(!GatewayErrorCode::NotFound.is_retryable());
    }

    #[test]
    fn gateway_error_display() {
        let err = GatewayError::network("connection reset");
        assert_eq!(err.to_string(), "network_error: connection reset");
    }

    #[test]
    fn invalid_webhook_converts_to_subscription_error() {
        let err: SubscriptionError = GatewayError::invalid_webhook("Invalid signature").into();
        assert_eq!(err, SubscriptionError::InvalidWebhook("Invalid signature".to_string()));
    }

    #[test]
    fn network_error_converts_to_retryable_subscription_error() {
        let err: SubscriptionError = GatewayError::network("timeout").into();
        assert!(err.is_retryable());
    }
}
