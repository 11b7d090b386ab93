//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Billing
//!
//! - `BillingGateway` - Subscription provider (Stripe) operations and webhooks
//!
//! ## Storage
//!
//! - `UserSubscriptionRepository` - Subscription fields of user records
//! - `PendingSubscriptionRepository` - Buffer for not-yet-associated subscriptions
//! - `ReconcileOutbox` - Durable retry queue for failed transitions
//!
//! ## Runtime
//!
//! - `SessionValidator` - Session token validation
//! - `Clock` - Current time
//! - `ScheduledJob` - Periodic background work

mod billing_gateway;
mod clock;
mod pending_subscription_repository;
mod reconcile_outbox;
mod scheduled_job;
mod session_validator;
mod user_subscription_repository;

pub use billing_gateway::{
    BillingGateway, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer,
    GatewayError, GatewayErrorCode, PaymentIntent, SubscriptionSnapshot, WebhookEvent,
    WebhookEventData, WebhookEventType,
};
pub use clock::Clock;
pub use pending_subscription_repository::PendingSubscriptionRepository;
pub use reconcile_outbox::{
    FailedTransition, FailedTransitionStatus, ReconcileOutbox, RetryPolicy, MAX_RETRY_DELAY_SECS,
};
pub use scheduled_job::ScheduledJob;
pub use session_validator::SessionValidator;
pub use user_subscription_repository::{UpdateResult, UserSubscriptionRepository};
