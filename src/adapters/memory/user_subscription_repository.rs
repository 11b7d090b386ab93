//! In-memory UserSubscriptionRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::poisoned;
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::subscription::{SubscriptionUpdate, UserSubscription};
use crate::ports::{UpdateResult, UserSubscriptionRepository};

/// User records keyed by id.
///
/// # Example
///
/// ```ignore
/// let repo = InMemoryUserSubscriptionRepository::new();
/// repo.insert(UserSubscription::new(user_id, "ada@example.com"));
/// ```
#[derive(Default)]
pub struct InMemoryUserSubscriptionRepository {
    users: RwLock<HashMap<UserId, UserSubscription>>,
}

impl InMemoryUserSubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces a user record.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert(&self, user: UserSubscription) {
        self.users
            .write()
            .expect("InMemoryUserSubscriptionRepository: write lock poisoned")
            .insert(user.user_id.clone(), user);
    }

    /// Current record for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn get(&self, user_id: &UserId) -> Option<UserSubscription> {
        self.users
            .read()
            .expect("InMemoryUserSubscriptionRepository: read lock poisoned")
            .get(user_id)
            .cloned()
    }

    fn find_where(
        &self,
        predicate: impl Fn(&UserSubscription) -> bool,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let users = self.users.read().map_err(|_| poisoned("users"))?;
        Ok(users.values().find(|u| predicate(u)).cloned())
    }
}

#[async_trait]
impl UserSubscriptionRepository for InMemoryUserSubscriptionRepository {
    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        self.find_where(|u| &u.user_id == user_id)
    }

    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        self.find_where(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
    }

    async fn find_by_stripe_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        self.find_where(|u| u.stripe_subscription_id.as_deref() == Some(subscription_id))
    }

    async fn update(
        &self,
        user_id: &UserId,
        update: &SubscriptionUpdate,
    ) -> Result<UpdateResult, DomainError> {
        let mut users = self.users.write().map_err(|_| poisoned("users"))?;
        let Some(user) = users.get_mut(user_id) else {
            return Ok(UpdateResult::NotFound);
        };

        if let Some(event_at) = &update.last_event_at {
            if !user.accepts_event_at(event_at) {
                return Ok(UpdateResult::Stale);
            }
        }

        user.apply(update);
        Ok(UpdateResult::Applied)
    }

    async fn demote_if_expired(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<UpdateResult, DomainError> {
        let mut users = self.users.write().map_err(|_| poisoned("users"))?;
        let Some(user) = users.get_mut(user_id) else {
            return Ok(UpdateResult::NotFound);
        };

        if !user.expiry_due(&now) {
            return Ok(UpdateResult::Stale);
        }

        user.apply(&SubscriptionUpdate::expiry_demotion());
        Ok(UpdateResult::Applied)
    }

    async fn find_expiry_candidates(
        &self,
        now: Timestamp,
    ) -> Result<Vec<UserSubscription>, DomainError> {
        let users = self.users.read().map_err(|_| poisoned("users"))?;
        let mut due: Vec<UserSubscription> = users
            .values()
            .filter(|u| u.expiry_due(&now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.user_id.as_str().cmp(b.user_id.as_str()));
        Ok(due)
    }
}
