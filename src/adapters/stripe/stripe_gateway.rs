//! Stripe billing gateway.
//!
//! Implements `BillingGateway` over the Stripe REST API.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) against replayed deliveries
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key, webhook_secret);
//! let gateway = StripeBillingGateway::new(config);
//! ```

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::{
    BillingGateway, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer,
    GatewayError, GatewayErrorCode, PaymentIntent, SubscriptionSnapshot, WebhookEvent, WebhookEventData,
    WebhookEventType,
};

use super::webhook_types::{
    SignatureHeader, StripeCheckoutSession, StripeCustomer, StripeInvoice, StripePaymentIntent,
    StripeSubscription, StripeWebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Default Stripe API host.
pub const STRIPE_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    api_base_url: String,

    /// Reject events Stripe marks as test-mode.
    require_livemode: bool,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: STRIPE_API_BASE_URL.to_string(),
            require_livemode: false,
        }
    }

    /// Point the client at another host (stripe-mock, local proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("require_livemode", &self.require_livemode)
            .finish()
    }
}

/// Stripe-backed `BillingGateway`.
pub struct StripeBillingGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn get_object<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, GatewayError> {
        let response = self
            .http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        read_object(response).await.map(Some)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;

        read_object(response).await
    }

    /// Check the HMAC and the signing timestamp.
    fn verify_signature(&self, payload: &[u8], header: &SignatureHeader) -> Result<(), GatewayError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                age_secs = age,
                "Webhook event too old - possible replay"
            );
            return Err(GatewayError::invalid_webhook(format!(
                "Event too old ({} seconds)",
                age
            )));
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                "Webhook event timestamp in the future"
            );
            return Err(GatewayError::invalid_webhook("Event timestamp in future"));
        }

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.expose_secret().as_bytes())
            .map_err(|e| GatewayError::invalid_webhook(format!("Invalid webhook secret: {}", e)))?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| expected.as_slice().ct_eq(candidate.as_slice()).unwrap_u8() == 1);

        if !matched {
            tracing::warn!("Webhook signature mismatch");
            return Err(GatewayError::invalid_webhook(
                "No signatures found matching the expected signature for payload",
            ));
        }

        Ok(())
    }

    /// Parse a Stripe event, enforcing livemode when configured and asked to.
    fn parse_event(&self, payload: &[u8], check_livemode: bool) -> Result<WebhookEvent, GatewayError> {
        let (livemode, event) = decode_event(payload)?;

        if check_livemode && self.config.require_livemode && !livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Err(GatewayError::invalid_webhook(
                "Test mode events not allowed in production",
            ));
        }

        Ok(event)
    }
}

/// Decode a Stripe event body. Returns the event's livemode flag alongside it.
pub(super) fn decode_event(payload: &[u8]) -> Result<(bool, WebhookEvent), GatewayError> {
    let stripe_event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse webhook payload");
        GatewayError::invalid_webhook(format!("Invalid JSON: {}", e))
    })?;

    let data = extract_event_data(&stripe_event)?;

    Ok((
        stripe_event.livemode,
        WebhookEvent {
            id: stripe_event.id,
            event_type: WebhookEventType::from_provider(&stripe_event.event_type),
            data,
            created_at: stripe_event.created,
        },
    ))
}

async fn read_object<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, error = %error_text, "Stripe API call failed");
        let err = match status {
            reqwest::StatusCode::UNAUTHORIZED => GatewayError::authentication(error_text),
            reqwest::StatusCode::TOO_MANY_REQUESTS => GatewayError::new(
                GatewayErrorCode::RateLimitExceeded,
                format!("Stripe API error: {}", error_text),
            ),
            s if s.is_client_error() => GatewayError::new(
                GatewayErrorCode::Unknown,
                format!("Stripe API error: {}", error_text),
            ),
            _ => GatewayError::provider(format!("Stripe API error: {}", error_text)),
        };
        return Err(err.with_provider_code(status.as_u16().to_string()));
    }

    response
        .json()
        .await
        .map_err(|e| GatewayError::provider(format!("Failed to parse Stripe response: {}", e)))
}

fn extract_event_data(event: &StripeWebhookEvent) -> Result<WebhookEventData, GatewayError> {
    let event_type = event.event_type.as_str();

    if event_type.starts_with("customer.subscription.") {
        let sub: StripeSubscription = serde_json::from_value(event.data.object.clone())
            .map_err(|e| GatewayError::invalid_webhook(format!("Invalid subscription: {}", e)))?;
        return Ok(WebhookEventData::Subscription {
            subscription_id: sub.id,
            customer_id: sub.customer.into_id(),
            status: SubscriptionStatus::parse(&sub.status),
        });
    }

    if event_type.starts_with("invoice.") {
        let invoice: StripeInvoice = serde_json::from_value(event.data.object.clone())
            .map_err(|e| GatewayError::invalid_webhook(format!("Invalid invoice: {}", e)))?;
        return Ok(WebhookEventData::Invoice {
            invoice_id: invoice.id,
            customer_id: invoice.customer.map(|c| c.into_id()),
            subscription_id: invoice.subscription.map(|s| s.into_id()),
            billing_reason: invoice.billing_reason,
            payment_intent: invoice.payment_intent.map(|p| p.into_id()),
        });
    }

    Ok(WebhookEventData::Raw {
        json: event.data.object.to_string(),
    })
}

fn to_snapshot(sub: StripeSubscription) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        current_period_start: sub.period_start().and_then(Timestamp::from_unix_secs),
        current_period_end: sub.period_end().and_then(Timestamp::from_unix_secs),
        canceled_at: sub.canceled_at.and_then(Timestamp::from_unix_secs),
        status: SubscriptionStatus::parse(&sub.status),
        cancel_at_period_end: sub.cancel_at_period_end,
        customer_id: sub.customer.into_id(),
        id: sub.id,
    }
}

#[async_trait]
impl BillingGateway for StripeBillingGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError> {
        let mut params = vec![
            ("email", request.email.clone()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];
        if let Some(name) = &request.name {
            params.push(("name", name.clone()));
        }

        let customer: StripeCustomer = self.post_form("/v1/customers", &params).await?;

        tracing::info!(customer_id = %customer.id, user_id = %request.user_id, "Stripe customer created");

        Ok(Customer {
            id: customer.id,
            email: customer.email.unwrap_or(request.email),
            name: customer.name.or(request.name),
        })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let params = vec![
            ("customer", request.customer_id),
            ("mode", "subscription".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price]", request.price_id),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
        ];

        let session: StripeCheckoutSession = self.post_form("/v1/checkout/sessions", &params).await?;
        let url = session
            .url
            .ok_or_else(|| GatewayError::provider("Checkout session has no URL"))?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError> {
        let sub: Option<StripeSubscription> = self
            .get_object(&format!("/v1/subscriptions/{}", subscription_id))
            .await?;
        Ok(sub.map(to_snapshot))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let sub: StripeSubscription = self
            .post_form(
                &format!("/v1/subscriptions/{}", subscription_id),
                &[("cancel_at_period_end", at_period_end.to_string())],
            )
            .await?;
        Ok(to_snapshot(sub))
    }

    async fn get_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntent>, GatewayError> {
        let intent: Option<StripePaymentIntent> = self
            .get_object(&format!("/v1/payment_intents/{}", payment_intent_id))
            .await?;
        Ok(intent.map(|pi| PaymentIntent {
            id: pi.id,
            payment_method: pi.payment_method.map(|m| m.into_id()),
        }))
    }

    async fn update_subscription_default_payment_method(
        &self,
        subscription_id: &str,
        payment_method_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let sub: StripeSubscription = self
            .post_form(
                &format!("/v1/subscriptions/{}", subscription_id),
                &[("default_payment_method", payment_method_id.to_string())],
            )
            .await?;
        Ok(to_snapshot(sub))
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatewayError> {
        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe-Signature header");
            GatewayError::invalid_webhook(e.to_string())
        })?;

        self.verify_signature(payload, &header)?;

        let event = self.parse_event(payload, true)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            "Webhook signature verified"
        );

        Ok(event)
    }

    fn parse_unsigned_webhook(&self, payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
        self.parse_event(payload, false)
    }
}
