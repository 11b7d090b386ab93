//! User subscription repository port.
//!
//! Reads and patches the subscription subset of the user record. Users are
//! created by the wider platform; this port never inserts or deletes them.
//!
//! # Design
//!
//! - **Patch writes**: every mutation is a `SubscriptionUpdate` overwrite
//! - **Ordering guard**: a patch carrying `last_event_at` older than the stored
//!   one is rejected inside the write itself, without a read-modify-write

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::subscription::{SubscriptionUpdate, UserSubscription};
use async_trait::async_trait;

/// Outcome of applying a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// The patch was written.
    Applied,
    /// The record holds a newer `last_event_at`, or no longer matches the
    /// write's precondition; nothing was written.
    Stale,
    /// No user with that id.
    NotFound,
}

/// Repository port for user subscription state.
#[async_trait]
pub trait UserSubscriptionRepository: Send + Sync {
    /// Find a user by ID.
    async fn find_by_user_id(&self, user_id: &UserId)
        -> Result<Option<UserSubscription>, DomainError>;

    /// Find the user owning a billing customer.
    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// Find the user owning a billing subscription.
    async fn find_by_stripe_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// Overwrite the fields set in `update`.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn update(
        &self,
        user_id: &UserId,
        update: &SubscriptionUpdate,
    ) -> Result<UpdateResult, DomainError>;

    /// Demote the user to free if its access still ran out at `now`.
    ///
    /// The expiry predicate is re-checked inside the write, so a user
    /// reactivated after the candidate scan is left alone and `Stale` is
    /// returned.
    async fn demote_if_expired(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<UpdateResult, DomainError>;

    /// Pro users whose status is canceled or past due.
    ///
    /// The sweeper decides per record whether the relevant end time passed;
    /// `now` lets implementations pre-filter.
    async fn find_expiry_candidates(
        &self,
        now: Timestamp,
    ) -> Result<Vec<UserSubscription>, DomainError>;
}
