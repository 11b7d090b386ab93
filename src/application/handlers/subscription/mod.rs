//! Subscription handlers.
//!
//! ## Commands
//! - Reconciling billing webhook events
//! - Creating checkout sessions
//! - Cancelling subscriptions
//!
//! ## Queries
//! - Get subscription status
//!
//! ## Scheduled jobs
//! - Expiry sweep
//! - Pending subscription link-back
//! - Failed transition retry

mod cancel_subscription;
mod create_checkout_session;
mod get_subscription_status;
mod handle_billing_webhook;
mod link_pending_subscriptions;
mod reconcile_billing_event;
mod retry_failed_transitions;
mod sweep_expired_subscriptions;

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_checkout_session::{
    CheckoutSettings, CreateCheckoutSessionCommand, CreateCheckoutSessionHandler,
    CreateCheckoutSessionResult, DEFAULT_FRONTEND_URL,
};
pub use handle_billing_webhook::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, HandleBillingWebhookResult,
};
pub use reconcile_billing_event::{ReconcileBillingEventHandler, ReconcileOutcome};

// Queries
pub use get_subscription_status::{
    GetSubscriptionStatusHandler, GetSubscriptionStatusQuery, GetSubscriptionStatusResult,
};

// Jobs
pub use link_pending_subscriptions::{LinkPendingSubscriptionsHandler, LinkResult};
pub use retry_failed_transitions::{RetryFailedTransitionsHandler, RetryResult, RetrySettings};
pub use sweep_expired_subscriptions::{SweepExpiredSubscriptionsHandler, SweepResult};
