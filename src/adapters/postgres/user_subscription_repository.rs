//! PostgreSQL implementation of UserSubscriptionRepository.
//!
//! Works on the subscription columns of the `users` table. Patches are written
//! with a single dynamic UPDATE whose WHERE clause carries the event-ordering
//! guard, so concurrent webhook deliveries never overwrite newer state.

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{
    SubscriptionStatus, SubscriptionTier, SubscriptionUpdate, UserSubscription,
};
use crate::ports::{UpdateResult, UserSubscriptionRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

const SELECT_COLUMNS: &str = r#"
    SELECT id, email, first_name, last_name, subscription_status, subscription_tier,
           stripe_customer_id, stripe_subscription_id, subscription_period_start,
           subscription_period_end, subscription_canceled_at, grace_period_end,
           subscription_created_at, subscription_last_event_at
    FROM users
"#;

/// PostgreSQL implementation of the UserSubscriptionRepository port.
pub struct PostgresUserSubscriptionRepository {
    pool: PgPool,
}

impl PostgresUserSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("{} WHERE {} = $1 LIMIT 1", SELECT_COLUMNS, column))
                .bind(value)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database("Failed to find user", e))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn exists(&self, user_id: &UserId) -> Result<bool, DomainError> {
        let found: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to check user", e))?;
        Ok(found.is_some())
    }
}

/// Database row representation of a user's subscription columns.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    subscription_status: Option<String>,
    subscription_tier: Option<String>,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    subscription_period_start: Option<DateTime<Utc>>,
    subscription_period_end: Option<DateTime<Utc>>,
    subscription_canceled_at: Option<DateTime<Utc>>,
    grace_period_end: Option<DateTime<Utc>>,
    subscription_created_at: Option<DateTime<Utc>>,
    subscription_last_event_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for UserSubscription {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let user_id = UserId::new(row.id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid user id: {}", e))
        })?;

        Ok(UserSubscription {
            user_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            status: row.subscription_status.as_deref().map(SubscriptionStatus::parse),
            tier: row.subscription_tier.as_deref().map(SubscriptionTier::parse),
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            period_start: row.subscription_period_start.map(Timestamp::from_datetime),
            period_end: row.subscription_period_end.map(Timestamp::from_datetime),
            canceled_at: row.subscription_canceled_at.map(Timestamp::from_datetime),
            grace_period_end: row.grace_period_end.map(Timestamp::from_datetime),
            subscription_created_at: row.subscription_created_at.map(Timestamp::from_datetime),
            last_event_at: row.subscription_last_event_at.map(Timestamp::from_datetime),
        })
    }
}

fn to_db(ts: &Timestamp) -> DateTime<Utc> {
    *ts.as_datetime()
}

/// Builds `UPDATE users SET ... WHERE id = $n [AND <ordering guard>]`.
fn build_update<'a>(user_id: &UserId, update: &SubscriptionUpdate) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET ");

    {
        let mut fields = builder.separated(", ");
        if let Some(status) = &update.status {
            fields
                .push("subscription_status = ")
                .push_bind_unseparated(status.as_str().to_string());
        }
        if let Some(tier) = update.tier {
            fields
                .push("subscription_tier = ")
                .push_bind_unseparated(tier.as_str());
        }
        if let Some(customer_id) = &update.stripe_customer_id {
            fields
                .push("stripe_customer_id = ")
                .push_bind_unseparated(customer_id.clone());
        }
        if let Some(subscription_id) = &update.stripe_subscription_id {
            fields
                .push("stripe_subscription_id = ")
                .push_bind_unseparated(subscription_id.clone());
        }
        if let Some(start) = &update.period_start {
            fields
                .push("subscription_period_start = ")
                .push_bind_unseparated(to_db(start));
        }
        if let Some(end) = &update.period_end {
            fields
                .push("subscription_period_end = ")
                .push_bind_unseparated(to_db(end));
        }
        if let Some(canceled_at) = &update.canceled_at {
            fields
                .push("subscription_canceled_at = ")
                .push_bind_unseparated(canceled_at.as_ref().map(to_db));
        }
        if let Some(grace) = &update.grace_period_end {
            fields
                .push("grace_period_end = ")
                .push_bind_unseparated(grace.as_ref().map(to_db));
        }
        if let Some(created) = &update.subscription_created_at {
            fields
                .push("subscription_created_at = ")
                .push_bind_unseparated(to_db(created));
        }
        if let Some(event_at) = &update.last_event_at {
            fields
                .push("subscription_last_event_at = ")
                .push_bind_unseparated(to_db(event_at));
        }
    }

    builder.push(" WHERE id = ").push_bind(user_id.as_str().to_string());

    if let Some(event_at) = &update.last_event_at {
        builder
            .push(" AND (subscription_last_event_at IS NULL OR subscription_last_event_at <= ")
            .push_bind(to_db(event_at))
            .push(")");
    }

    builder
}

#[async_trait]
impl UserSubscriptionRepository for PostgresUserSubscriptionRepository {
    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        self.find_one("id", user_id.as_str()).await
    }

    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        self.find_one("stripe_customer_id", customer_id).await
    }

    async fn find_by_stripe_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        self.find_one("stripe_subscription_id", subscription_id).await
    }

    async fn update(
        &self,
        user_id: &UserId,
        update: &SubscriptionUpdate,
    ) -> Result<UpdateResult, DomainError> {
        if update.is_empty() {
            return Ok(if self.exists(user_id).await? {
                UpdateResult::Applied
            } else {
                UpdateResult::NotFound
            });
        }

        let result = build_update(user_id, update)
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to update subscription", e))?;

        if result.rows_affected() > 0 {
            return Ok(UpdateResult::Applied);
        }

        // Zero rows: either the user is gone or the ordering guard refused the write.
        if self.exists(user_id).await? {
            Ok(UpdateResult::Stale)
        } else {
            Ok(UpdateResult::NotFound)
        }
    }

    async fn demote_if_expired(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<UpdateResult, DomainError> {
        // Same predicate as find_expiry_candidates, evaluated by the write.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET subscription_tier = 'free', subscription_status = 'canceled'
            WHERE id = $1
              AND subscription_tier = 'pro'
              AND (
                (subscription_status = 'canceled' AND subscription_period_end < $2)
                OR (subscription_status = 'past_due' AND grace_period_end < $2)
              )
            "#,
        )
        .bind(user_id.as_str())
        .bind(to_db(&now))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to demote expired subscription", e))?;

        if result.rows_affected() > 0 {
            return Ok(UpdateResult::Applied);
        }

        if self.exists(user_id).await? {
            Ok(UpdateResult::Stale)
        } else {
            Ok(UpdateResult::NotFound)
        }
    }

    async fn find_expiry_candidates(
        &self,
        now: Timestamp,
    ) -> Result<Vec<UserSubscription>, DomainError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE subscription_tier = 'pro'
              AND (
                (subscription_status = 'canceled' AND subscription_period_end < $1)
                OR (subscription_status = 'past_due' AND grace_period_end < $1)
              )
            ORDER BY id
            "#,
            SELECT_COLUMNS
        ))
        .bind(to_db(&now))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to find expired subscriptions", e))?;

        rows.into_iter().map(UserSubscription::try_from).collect()
    }
}
