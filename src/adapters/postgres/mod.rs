//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresUserSubscriptionRepository` - Subscription columns of `users`
//! - `PostgresPendingSubscriptionRepository` - Pending-association buffer
//! - `PostgresReconcileOutbox` - Retry outbox for failed transitions

mod pending_subscription_repository;
mod reconcile_outbox;
mod user_subscription_repository;

pub use pending_subscription_repository::PostgresPendingSubscriptionRepository;
pub use reconcile_outbox::PostgresReconcileOutbox;
pub use user_subscription_repository::PostgresUserSubscriptionRepository;
