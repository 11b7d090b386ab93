//! Subscription-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | UserNotFound | 404 |
//! | AlreadySubscribed | 400 |
//! | NoActiveSubscription | 400 |
//! | MissingSignature | 400 |
//! | InvalidWebhook | 400 |
//! | Gateway | 502 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Errors raised by subscription commands and the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// No user record for the authenticated id.
    UserNotFound(UserId),

    /// Checkout refused: the user already has an active pro subscription.
    AlreadySubscribed(UserId),

    /// Cancellation refused: nothing to cancel.
    NoActiveSubscription(UserId),

    /// Webhook arrived without `Stripe-Signature` outside test mode.
    MissingSignature,

    /// Webhook signature or payload rejected.
    InvalidWebhook(String),

    /// Billing provider call failed.
    Gateway { message: String, retryable: bool },

    /// Record store failure.
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn user_not_found(user_id: UserId) -> Self {
        SubscriptionError::UserNotFound(user_id)
    }

    pub fn already_subscribed(user_id: UserId) -> Self {
        SubscriptionError::AlreadySubscribed(user_id)
    }

    pub fn no_active_subscription(user_id: UserId) -> Self {
        SubscriptionError::NoActiveSubscription(user_id)
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        SubscriptionError::InvalidWebhook(message.into())
    }

    pub fn gateway(message: impl Into<String>, retryable: bool) -> Self {
        SubscriptionError::Gateway {
            message: message.into(),
            retryable,
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SubscriptionError::UserNotFound(_) => "USER_NOT_FOUND",
            SubscriptionError::AlreadySubscribed(_) => "ALREADY_SUBSCRIBED",
            SubscriptionError::NoActiveSubscription(_) => "NO_ACTIVE_SUBSCRIPTION",
            SubscriptionError::MissingSignature => "MISSING_SIGNATURE",
            SubscriptionError::InvalidWebhook(_) => "INVALID_WEBHOOK",
            SubscriptionError::Gateway { .. } => "BILLING_PROVIDER_ERROR",
            SubscriptionError::Infrastructure(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to API callers.
    pub fn message(&self) -> String {
        match self {
            SubscriptionError::UserNotFound(_) => "User not found".to_string(),
            SubscriptionError::AlreadySubscribed(_) => {
                "User already has an active subscription".to_string()
            }
            SubscriptionError::NoActiveSubscription(_) => {
                "No active subscription found".to_string()
            }
            SubscriptionError::MissingSignature => "Missing stripe-signature header".to_string(),
            SubscriptionError::InvalidWebhook(msg) => format!("Webhook Error: {}", msg),
            SubscriptionError::Gateway { message, .. } => message.clone(),
            SubscriptionError::Infrastructure(msg) => msg.clone(),
        }
    }

    /// Transition failures worth parking in the retry outbox.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubscriptionError::Gateway { retryable, .. } => *retryable,
            SubscriptionError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SubscriptionError {}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        SubscriptionError::Infrastructure(err.to_string())
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        let code = match err {
            SubscriptionError::UserNotFound(_) => ErrorCode::UserNotFound,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
            _ => ErrorCode::InternalError,
        };
        DomainError::new(code, err.message())
    }
}
