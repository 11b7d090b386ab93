//! PostgreSQL implementation of the ReconcileOutbox port.
//!
//! Failed transitions live in `reconcile_outbox`; the event is stored as JSONB
//! so the retry job can replay it without the original webhook body.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, OutboxEntryId, Timestamp};
use crate::ports::{FailedTransition, FailedTransitionStatus, ReconcileOutbox, WebhookEvent};

/// PostgreSQL-backed retry outbox.
pub struct PostgresReconcileOutbox {
    pool: PgPool,
}

impl PostgresReconcileOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    event: serde_json::Value,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    next_attempt_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRow> for FailedTransition {
    type Error = DomainError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let event: WebhookEvent = serde_json::from_value(row.event).map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationError,
                format!("Invalid stored event: {}", e),
            )
            .with_detail("outbox_id", row.id.to_string())
        })?;

        let status = FailedTransitionStatus::parse(&row.status).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid outbox status: {}", row.status),
            )
        })?;

        Ok(FailedTransition {
            id: OutboxEntryId::from_uuid(row.id),
            event,
            status,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_error: row.last_error,
            created_at: Timestamp::from_datetime(row.created_at),
            next_attempt_at: Timestamp::from_datetime(row.next_attempt_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
        })
    }
}

#[async_trait]
impl ReconcileOutbox for PostgresReconcileOutbox {
    async fn enqueue(&self, entry: &FailedTransition) -> Result<(), DomainError> {
        let event = serde_json::to_value(&entry.event).map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationError,
                format!("Failed to serialize event: {}", e),
            )
        })?;

        sqlx::query(
            r#"
            INSERT INTO reconcile_outbox (
                id, event_id, event_type, event, status, attempts, last_error,
                created_at, next_attempt_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(&entry.event.id)
        .bind(entry.event.event_type.as_str())
        .bind(event)
        .bind(entry.status.as_str())
        .bind(i32::try_from(entry.attempts).unwrap_or(i32::MAX))
        .bind(&entry.last_error)
        .bind(entry.created_at.as_datetime())
        .bind(entry.next_attempt_at.as_datetime())
        .bind(entry.processed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to enqueue failed transition", e))?;

        Ok(())
    }

    async fn get_due(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<FailedTransition>, DomainError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT id, event, status, attempts, last_error, created_at, next_attempt_at, processed_at
            FROM reconcile_outbox
            WHERE status = 'pending' AND next_attempt_at <= $1
            ORDER BY next_attempt_at ASC
            LIMIT $2
            "#,
        )
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch due transitions", e))?;

        rows.into_iter().map(FailedTransition::try_from).collect()
    }

    async fn update(&self, entry: &FailedTransition) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE reconcile_outbox SET
                status = $2,
                attempts = $3,
                last_error = $4,
                next_attempt_at = $5,
                processed_at = $6
            WHERE id = $1
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.status.as_str())
        .bind(i32::try_from(entry.attempts).unwrap_or(i32::MAX))
        .bind(&entry.last_error)
        .bind(entry.next_attempt_at.as_datetime())
        .bind(entry.processed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to update failed transition", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::OutboxEntryNotFound,
                format!("Outbox entry {} not found", entry.id),
            ));
        }

        Ok(())
    }

    async fn cleanup_resolved(&self, before: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM reconcile_outbox WHERE status = 'resolved' AND processed_at < $1",
        )
        .bind(before.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to purge resolved transitions", e))?;

        Ok(result.rows_affected())
    }
}
