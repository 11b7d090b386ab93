//! In-memory adapters for the storage ports.
//!
//! Used by tests and by local runs without a database
//! (`SUMMARIZZ__DATABASE__URL` unset). State is lost on restart.

mod pending_subscription_repository;
mod reconcile_outbox;
mod user_subscription_repository;

pub use pending_subscription_repository::InMemoryPendingSubscriptionRepository;
pub use reconcile_outbox::InMemoryReconcileOutbox;
pub use user_subscription_repository::InMemoryUserSubscriptionRepository;

use crate::domain::foundation::{DomainError, ErrorCode};

fn poisoned(store: &str) -> DomainError {
    DomainError::new(ErrorCode::InternalError, format!("{} lock poisoned", store))
}
