//! PostgreSQL implementation of PendingSubscriptionRepository.

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{PendingSubscription, SubscriptionStatus};
use crate::ports::PendingSubscriptionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// PostgreSQL implementation of the PendingSubscriptionRepository port.
pub struct PostgresPendingSubscriptionRepository {
    pool: PgPool,
}

impl PostgresPendingSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PendingRow {
    stripe_subscription_id: String,
    stripe_customer_id: Option<String>,
    status: String,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    grace_period_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processed: bool,
    linked_user_id: Option<String>,
    last_event_at: Option<DateTime<Utc>>,
    last_link_attempt_at: Option<DateTime<Utc>>,
}

impl TryFrom<PendingRow> for PendingSubscription {
    type Error = DomainError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        let linked_user_id = row
            .linked_user_id
            .map(UserId::new)
            .transpose()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Invalid linked user id: {}", e),
                )
            })?;

        Ok(PendingSubscription {
            stripe_subscription_id: row.stripe_subscription_id,
            stripe_customer_id: row.stripe_customer_id,
            status: SubscriptionStatus::parse(&row.status),
            period_start: row.period_start.map(Timestamp::from_datetime),
            period_end: row.period_end.map(Timestamp::from_datetime),
            canceled_at: row.canceled_at.map(Timestamp::from_datetime),
            grace_period_end: row.grace_period_end.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            processed: row.processed,
            linked_user_id,
            last_event_at: row.last_event_at.map(Timestamp::from_datetime),
            last_link_attempt_at: row.last_link_attempt_at.map(Timestamp::from_datetime),
        })
    }
}

#[async_trait]
impl PendingSubscriptionRepository for PostgresPendingSubscriptionRepository {
    async fn find(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PendingSubscription>, DomainError> {
        let row: Option<PendingRow> = sqlx::query_as(
            r#"
            SELECT stripe_subscription_id, stripe_customer_id, status, period_start, period_end,
                   canceled_at, grace_period_end, created_at, updated_at, processed,
                   linked_user_id, last_event_at, last_link_attempt_at
            FROM pending_subscriptions
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to find pending subscription", e))?;

        row.map(PendingSubscription::try_from).transpose()
    }

    async fn upsert(&self, pending: &PendingSubscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO pending_subscriptions (
                stripe_subscription_id, stripe_customer_id, status, period_start, period_end,
                canceled_at, grace_period_end, created_at, updated_at, processed,
                linked_user_id, last_event_at, last_link_attempt_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                status = EXCLUDED.status,
                period_start = EXCLUDED.period_start,
                period_end = EXCLUDED.period_end,
                canceled_at = EXCLUDED.canceled_at,
                grace_period_end = EXCLUDED.grace_period_end,
                updated_at = EXCLUDED.updated_at,
                processed = EXCLUDED.processed,
                linked_user_id = EXCLUDED.linked_user_id,
                last_event_at = EXCLUDED.last_event_at,
                last_link_attempt_at = EXCLUDED.last_link_attempt_at
            "#,
        )
        .bind(&pending.stripe_subscription_id)
        .bind(&pending.stripe_customer_id)
        .bind(pending.status.as_str())
        .bind(pending.period_start.map(|t| *t.as_datetime()))
        .bind(pending.period_end.map(|t| *t.as_datetime()))
        .bind(pending.canceled_at.map(|t| *t.as_datetime()))
        .bind(pending.grace_period_end.map(|t| *t.as_datetime()))
        .bind(pending.created_at.as_datetime())
        .bind(pending.updated_at.as_datetime())
        .bind(pending.processed)
        .bind(pending.linked_user_id.as_ref().map(|id| id.as_str()))
        .bind(pending.last_event_at.map(|t| *t.as_datetime()))
        .bind(pending.last_link_attempt_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to save pending subscription", e))?;

        Ok(())
    }

    async fn find_unprocessed(&self, limit: u32) -> Result<Vec<PendingSubscription>, DomainError> {
        let rows: Vec<PendingRow> = sqlx::query_as(
            r#"
            SELECT stripe_subscription_id, stripe_customer_id, status, period_start, period_end,
                   canceled_at, grace_period_end, created_at, updated_at, processed,
                   linked_user_id, last_event_at, last_link_attempt_at
            FROM pending_subscriptions
            WHERE processed = FALSE
            ORDER BY last_link_attempt_at ASC NULLS FIRST, created_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list pending subscriptions", e))?;

        rows.into_iter().map(PendingSubscription::try_from).collect()
    }

    async fn mark_link_attempted(
        &self,
        subscription_id: &str,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE pending_subscriptions
            SET last_link_attempt_at = $2
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to stamp pending link attempt", e))?;

        Ok(())
    }
}
