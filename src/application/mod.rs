//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Webhook reconciliation and the user-facing endpoints are commands and
//! queries; maintenance work runs as scheduled jobs.

pub mod handlers;

pub use handlers::subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CheckoutSettings, CreateCheckoutSessionCommand, CreateCheckoutSessionHandler,
    CreateCheckoutSessionResult, GetSubscriptionStatusHandler, GetSubscriptionStatusQuery,
    GetSubscriptionStatusResult, HandleBillingWebhookCommand, HandleBillingWebhookHandler,
    HandleBillingWebhookResult, LinkPendingSubscriptionsHandler, LinkResult,
    ReconcileBillingEventHandler, ReconcileOutcome, RetryFailedTransitionsHandler, RetryResult,
    RetrySettings, SweepExpiredSubscriptionsHandler, SweepResult, DEFAULT_FRONTEND_URL,
};
