//! HTTP DTOs (Data Transfer Objects) for subscription endpoints.
//!
//! Field names follow the frontend's camelCase contract. Timestamps are RFC 3339
//! strings or `null`.

use serde::{Deserialize, Serialize};

use crate::application::handlers::subscription::{
    CancelSubscriptionResult, CreateCheckoutSessionResult, GetSubscriptionStatusResult,
};
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{SubscriptionStatus, SubscriptionTier};

fn rfc3339(ts: Option<Timestamp>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Query string for `GET /subscription/status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQueryParams {
    /// Only the literal `true` triggers a refresh.
    #[serde(rename = "forceRefresh", default)]
    pub force_refresh: Option<String>,
}

impl StatusQueryParams {
    pub fn force_refresh(&self) -> bool {
        self.force_refresh.as_deref() == Some("true")
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Acknowledgement returned to the billing provider.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceivedResponse {
    pub received: bool,
}

/// Hosted checkout page to redirect the user to.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionResponse {
    pub url: String,
}

impl From<CreateCheckoutSessionResult> for CheckoutSessionResponse {
    fn from(result: CreateCheckoutSessionResult) -> Self {
        Self { url: result.url }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionResponse {
    pub message: String,
    /// When Pro access ends.
    pub will_end_on: Option<String>,
}

impl From<CancelSubscriptionResult> for CancelSubscriptionResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            message: "Subscription canceled successfully".to_string(),
            will_end_on: rfc3339(result.will_end_on),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub status: SubscriptionStatus,
    pub tier: SubscriptionTier,
    pub period_end: Option<String>,
    pub canceled_at: Option<String>,
    pub grace_period_end: Option<String>,
}

impl From<GetSubscriptionStatusResult> for SubscriptionStatusResponse {
    fn from(result: GetSubscriptionStatusResult) -> Self {
        Self {
            status: result.status,
            tier: result.tier,
            period_end: rfc3339(result.period_end),
            canceled_at: rfc3339(result.canceled_at),
            grace_period_end: rfc3339(result.grace_period_end),
        }
    }
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
    /// Tells the frontend to send the user to subscription management.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to_manage: Option<bool>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            redirect_to_manage: None,
        }
    }

    pub fn redirect_to_manage(mut self) -> Self {
        self.redirect_to_manage = Some(true);
        self
    }
}
