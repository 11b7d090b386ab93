//! Pending subscription repository port.
//!
//! Buffers subscription state for billing ids that no user owns yet, keyed by
//! the provider subscription id.

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::subscription::PendingSubscription;
use async_trait::async_trait;

/// Repository port for the pending-association buffer.
#[async_trait]
pub trait PendingSubscriptionRepository: Send + Sync {
    /// Find the record for a subscription id.
    async fn find(&self, subscription_id: &str)
        -> Result<Option<PendingSubscription>, DomainError>;

    /// Insert the record, or replace the one with the same subscription id.
    async fn upsert(&self, pending: &PendingSubscription) -> Result<(), DomainError>;

    /// Records not yet folded into a user.
    ///
    /// Records never tried by the linker come first, then the least recently
    /// tried, then the oldest. Unmatched records therefore rotate to the back
    /// and cannot starve newer ones.
    async fn find_unprocessed(&self, limit: u32) -> Result<Vec<PendingSubscription>, DomainError>;

    /// Stamp a failed owner lookup. No-op when the record does not exist.
    async fn mark_link_attempted(
        &self,
        subscription_id: &str,
        at: Timestamp,
    ) -> Result<(), DomainError>;
}
