//! In-memory PendingSubscriptionRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::poisoned;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::subscription::PendingSubscription;
use crate::ports::PendingSubscriptionRepository;

/// Pending records keyed by subscription id.
#[derive(Default)]
pub struct InMemoryPendingSubscriptionRepository {
    records: RwLock<HashMap<String, PendingSubscription>>,
}

impl InMemoryPendingSubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn get(&self, subscription_id: &str) -> Option<PendingSubscription> {
        self.records
            .read()
            .expect("InMemoryPendingSubscriptionRepository: read lock poisoned")
            .get(subscription_id)
            .cloned()
    }

    /// Number of stored records, processed or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .expect("InMemoryPendingSubscriptionRepository: read lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PendingSubscriptionRepository for InMemoryPendingSubscriptionRepository {
    async fn find(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PendingSubscription>, DomainError> {
        let records = self.records.read().map_err(|_| poisoned("pending"))?;
        Ok(records.get(subscription_id).cloned())
    }

    async fn upsert(&self, pending: &PendingSubscription) -> Result<(), DomainError> {
        let mut records = self.records.write().map_err(|_| poisoned("pending"))?;
        let created_at = records
            .get(&pending.stripe_subscription_id)
            .map(|existing| existing.created_at);

        let mut stored = pending.clone();
        if let Some(created_at) = created_at {
            stored.created_at = created_at;
        }
        records.insert(stored.stripe_subscription_id.clone(), stored);
        Ok(())
    }

    async fn find_unprocessed(&self, limit: u32) -> Result<Vec<PendingSubscription>, DomainError> {
        let records = self.records.read().map_err(|_| poisoned("pending"))?;
        let mut unprocessed: Vec<PendingSubscription> =
            records.values().filter(|p| !p.processed).cloned().collect();
        unprocessed.sort_by_key(|p| (p.last_link_attempt_at, p.created_at));
        unprocessed.truncate(limit as usize);
        Ok(unprocessed)
    }

    async fn mark_link_attempted(
        &self,
        subscription_id: &str,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let mut records = self.records.write().map_err(|_| poisoned("pending"))?;
        if let Some(record) = records.get_mut(subscription_id) {
            record.last_link_attempt_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    #[tokio::test]
    async fn upsert_keeps_original_created_at() {
        let repo = InMemoryPendingSubscriptionRepository::new();
        repo.upsert(&PendingSubscription::new("sub_1", None, at(10)))
            .await
            .unwrap();

        repo.upsert(&PendingSubscription::new("sub_1", Some("cus_1".to_string()), at(20)))
            .await
            .unwrap();

        let stored = repo.get("sub_1").unwrap();
        assert_eq!(stored.created_at, at(10));
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn find_unprocessed_skips_linked_and_orders_oldest_first() {
        let repo = InMemoryPendingSubscriptionRepository::new();
        let mut linked = PendingSubscription::new("sub_linked", None, at(1));
        linked.mark_linked(UserId::new("uid-1").unwrap(), at(2));
        repo.upsert(&linked).await.unwrap();
        repo.upsert(&PendingSubscription::new("sub_new", None, at(30)))
            .await
            .unwrap();
        repo.upsert(&PendingSubscription::new("sub_old", None, at(20)))
            .await
            .unwrap();

        let found = repo.find_unprocessed(10).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|p| p.stripe_subscription_id.as_str()).collect();
        assert_eq!(ids, vec!["sub_old", "sub_new"]);

        assert_eq!(repo.find_unprocessed(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn attempted_records_rotate_behind_untried_ones() {
        let repo = InMemoryPendingSubscriptionRepository::new();
        repo.upsert(&PendingSubscription::new("sub_a", None, at(10)))
            .await
            .unwrap();
        repo.upsert(&PendingSubscription::new("sub_b", None, at(11)))
            .await
            .unwrap();
        repo.upsert(&PendingSubscription::new("sub_c", None, at(50)))
            .await
            .unwrap();

        repo.mark_link_attempted("sub_a", at(100)).await.unwrap();
        repo.mark_link_attempted("sub_b", at(90)).await.unwrap();
        repo.mark_link_attempted("sub_missing", at(90)).await.unwrap();

        let found = repo.find_unprocessed(10).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|p| p.stripe_subscription_id.as_str()).collect();
        assert_eq!(ids, vec!["sub_c", "sub_b", "sub_a"]);
        assert_eq!(repo.get("sub_a").unwrap().last_link_attempt_at, Some(at(100)));
    }
}
