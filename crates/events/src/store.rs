//! Outbox storage trait and the in-memory reference implementation.
//!
//! The real deployment backs this with the relational store the business
//! mutations commit to; that store is an external collaborator, so only the
//! contract lives here. The published watermark is what makes at-least-once
//! true across a relay crash: a record is only marked after a successful
//! publish, so a crash in between re-delivers it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::record::EventRecord;
use crate::types::EventId;

/// Trait for outbox storage backends.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Durably append a single record.
    async fn append(&self, record: EventRecord) -> Result<()>;

    /// Append a batch all-or-nothing. This is the transactional commit
    /// path: either every record lands or none does.
    async fn append_batch(&self, records: Vec<EventRecord>) -> Result<()>;

    /// Unpublished records in append order, up to `limit`.
    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<EventRecord>>;

    /// Mark a record as published to the bus.
    async fn mark_published(&self, id: EventId) -> Result<()>;

    /// Total number of appended records.
    async fn count(&self) -> Result<usize>;

    /// Number of records already published.
    async fn published_count(&self) -> Result<usize>;
}

#[derive(Default)]
struct Inner {
    records: Vec<EventRecord>,
    published: HashSet<EventId>,
}

/// In-memory outbox for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryOutboxStore {
    inner: RwLock<Inner>,
}

impl InMemoryOutboxStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, record: EventRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.records.push(record);
        Ok(())
    }

    async fn append_batch(&self, records: Vec<EventRecord>) -> Result<()> {
        // Single write-lock acquisition keeps the batch atomic.
        let mut inner = self.inner.write().await;
        inner.records.extend(records);
        Ok(())
    }

    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<EventRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| !inner.published.contains(&r.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: EventId) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.records.iter().any(|r| r.id == id) {
            return Err(Error::event_not_found(id.to_string()));
        }
        inner.published.insert(id);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let inner = self.inner.read().await;
        Ok(inner.records.len())
    }

    async fn published_count(&self) -> Result<usize> {
        let inner = self.inner.read().await;
        Ok(inner.published.len())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::record::{EventPayload, EventRecordInput};
    use crate::types::{AggregateType, EventName};

    fn record(aggregate_id: &str) -> EventRecord {
        EventRecord::assign(
            EventRecordInput::new(
                EventName::parse("chat.message.created").unwrap(),
                AggregateType::Message,
                aggregate_id,
            )
            .with_payload(EventPayload::new().with_chat("c1")),
        )
    }

    #[tokio::test]
    async fn test_append_and_fetch() {
        let store = InMemoryOutboxStore::new();
        store.append(record("m1")).await.unwrap();

        let pending = store.fetch_unpublished(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.published_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_preserves_append_order() {
        let store = InMemoryOutboxStore::new();
        let first = record("m1");
        let second = record("m2");
        store.append(first.clone()).await.unwrap();
        store.append(second.clone()).await.unwrap();

        let pending = store.fetch_unpublished(10).await.unwrap();
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);
    }

    #[tokio::test]
    async fn test_mark_published_removes_from_pending() {
        let store = InMemoryOutboxStore::new();
        let r = record("m1");
        store.append(r.clone()).await.unwrap();
        store.mark_published(r.id).await.unwrap();

        assert!(store.fetch_unpublished(10).await.unwrap().is_empty());
        assert_eq!(store.published_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_published_unknown_id_fails() {
        let store = InMemoryOutboxStore::new();
        let err = store.mark_published(EventId::new()).await.unwrap_err();
        assert!(matches!(err, Error::EventNotFound { .. }));
    }

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let store = InMemoryOutboxStore::new();
        for i in 0..5 {
            store.append(record(&format!("m{i}"))).await.unwrap();
        }
        assert_eq!(store.fetch_unpublished(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_append_batch_lands_together() {
        let store = InMemoryOutboxStore::new();
        store
            .append_batch(vec![record("m1"), record("m2")])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
