//! In-memory ReconcileOutbox.

use async_trait::async_trait;
use std::sync::RwLock;

use super::poisoned;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{FailedTransition, FailedTransitionStatus, ReconcileOutbox};

/// Retry outbox kept in a vector, insertion ordered.
#[derive(Default)]
pub struct InMemoryReconcileOutbox {
    entries: RwLock<Vec<FailedTransition>>,
}

impl InMemoryReconcileOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn entries(&self) -> Vec<FailedTransition> {
        self.entries
            .read()
            .expect("InMemoryReconcileOutbox: read lock poisoned")
            .clone()
    }
}

#[async_trait]
impl ReconcileOutbox for InMemoryReconcileOutbox {
    async fn enqueue(&self, entry: &FailedTransition) -> Result<(), DomainError> {
        self.entries
            .write()
            .map_err(|_| poisoned("outbox"))?
            .push(entry.clone());
        Ok(())
    }

    async fn get_due(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<FailedTransition>, DomainError> {
        let entries = self.entries.read().map_err(|_| poisoned("outbox"))?;
        let mut due: Vec<FailedTransition> = entries
            .iter()
            .filter(|e| e.status == FailedTransitionStatus::Pending && !e.next_attempt_at.is_after(&now))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_attempt_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn update(&self, entry: &FailedTransition) -> Result<(), DomainError> {
        let mut entries = self.entries.write().map_err(|_| poisoned("outbox"))?;
        let stored = entries.iter_mut().find(|e| e.id == entry.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::OutboxEntryNotFound,
                format!("Outbox entry {} not found", entry.id),
            )
        })?;
        *stored = entry.clone();
        Ok(())
    }

    async fn cleanup_resolved(&self, before: Timestamp) -> Result<u64, DomainError> {
        let mut entries = self.entries.write().map_err(|_| poisoned("outbox"))?;
        let initial = entries.len();
        entries.retain(|e| {
            !(e.status == FailedTransitionStatus::Resolved
                && e.processed_at.map_or(false, |at| at.is_before(&before)))
        });
        Ok((initial - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{RetryPolicy, WebhookEvent, WebhookEventData, WebhookEventType};

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn entry(now: Timestamp) -> FailedTransition {
        let event = WebhookEvent {
            id: "evt_1".to_string(),
            event_type: WebhookEventType::SubscriptionUpdated,
            data: WebhookEventData::Raw {
                json: "{}".to_string(),
            },
            created_at: now.as_unix_secs(),
        };
        FailedTransition::new(event, "db down", now, &RetryPolicy::new(30, 5))
    }

    #[tokio::test]
    async fn due_entries_respect_next_attempt() {
        let outbox = InMemoryReconcileOutbox::new();
        outbox.enqueue(&entry(at(1000))).await.unwrap();

        assert!(outbox.get_due(at(1029), 10).await.unwrap().is_empty());
        assert_eq!(outbox.get_due(at(1030), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolved_entries_are_not_due_and_get_purged() {
        let outbox = InMemoryReconcileOutbox::new();
        let mut e = entry(at(1000));
        outbox.enqueue(&e).await.unwrap();

        e.mark_resolved(at(2000));
        outbox.update(&e).await.unwrap();

        assert!(outbox.get_due(at(5000), 10).await.unwrap().is_empty());
        assert_eq!(outbox.cleanup_resolved(at(1500)).await.unwrap(), 0);
        assert_eq!(outbox.cleanup_resolved(at(2500)).await.unwrap(), 1);
        assert!(outbox.entries().is_empty());
    }

    #[tokio::test]
    async fn update_unknown_entry_fails() {
        let outbox = InMemoryReconcileOutbox::new();
        let err = outbox.update(&entry(at(1000))).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::OutboxEntryNotFound);
    }
}
