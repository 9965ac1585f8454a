//! Outbox writer: the append contract between business mutations and the
//! event pipeline.
//!
//! Two capability variants sit behind one [`Appender`] interface so callers
//! state their durability expectation at the call site:
//!
//! - [`TransactionalAppender`] stages records into a caller-held
//!   [`OutboxTransaction`] that commits atomically with the business
//!   mutation. This is the only form that guarantees "no event without a
//!   committed change, no committed change without an event", and callers
//!   holding a transaction scope must prefer it.
//! - [`BestEffortAppender`] commits independently. A store failure is logged
//!   and swallowed; the business operation that triggered the append never
//!   fails because of it. A crash between the business commit and this
//!   append loses only the realtime notification: downstream state is still
//!   reachable through the normal read path.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Error as EventError;
use crate::record::{EventRecord, EventRecordInput};
use crate::store::OutboxStore;

/// Errors surfaced by the append path.
#[derive(Debug, Error)]
pub enum AppendError {
    /// The transaction scope was already committed or rolled back.
    #[error("outbox transaction already closed")]
    Closed,

    /// The underlying store rejected the write.
    #[error(transparent)]
    Store(#[from] EventError),
}

/// Append an event record to the outbox.
#[async_trait]
pub trait Appender: Send + Sync {
    /// Assign id/timestamp/version and append the record.
    async fn append(&self, input: EventRecordInput) -> Result<EventRecord, AppendError>;
}

/// Appender that commits each record independently.
///
/// Used when the business mutation already committed. Failures are
/// best-effort by contract: logged, never propagated.
pub struct BestEffortAppender {
    store: Arc<dyn OutboxStore>,
}

impl BestEffortAppender {
    /// Create a new best-effort appender over the given store.
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Appender for BestEffortAppender {
    async fn append(&self, input: EventRecordInput) -> Result<EventRecord, AppendError> {
        let record = EventRecord::assign(input);
        match self.store.append(record.clone()).await {
            Ok(()) => {
                debug!(event_id = %record.id, name = %record.name, "appended event record");
            }
            Err(e) => {
                warn!(
                    event_id = %record.id,
                    name = %record.name,
                    error = %e,
                    "best-effort append failed; realtime notification for this change is lost"
                );
            }
        }
        Ok(record)
    }
}

enum TxState {
    Open(Vec<EventRecord>),
    Closed,
}

/// A caller-held staging scope tied to the business transaction.
///
/// Records appended through [`OutboxTransaction::appender`] are buffered
/// until [`commit`](OutboxTransaction::commit) writes them in one atomic
/// batch. A commit failure propagates so the caller aborts the whole
/// operation; mutation and events stay atomic.
pub struct OutboxTransaction {
    state: Arc<Mutex<TxState>>,
}

impl OutboxTransaction {
    /// Open a new transaction scope.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TxState::Open(Vec::new()))),
        }
    }

    /// An appender that stages records into this scope.
    pub fn appender(&self) -> TransactionalAppender {
        TransactionalAppender {
            state: Arc::clone(&self.state),
        }
    }

    /// Number of records currently staged.
    pub async fn staged_len(&self) -> usize {
        match &*self.state.lock().await {
            TxState::Open(staged) => staged.len(),
            TxState::Closed => 0,
        }
    }

    /// Commit every staged record atomically.
    ///
    /// Returns the committed records in staging order. A store failure
    /// closes the scope and propagates: nothing was written.
    pub async fn commit(self, store: &dyn OutboxStore) -> Result<Vec<EventRecord>, AppendError> {
        let staged = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, TxState::Closed) {
                TxState::Open(staged) => staged,
                TxState::Closed => return Err(AppendError::Closed),
            }
        };
        store.append_batch(staged.clone()).await?;
        debug!(count = staged.len(), "committed outbox transaction");
        Ok(staged)
    }

    /// Discard every staged record and close the scope.
    pub async fn rollback(self) {
        let mut state = self.state.lock().await;
        *state = TxState::Closed;
    }
}

impl Default for OutboxTransaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Appender bound to an open [`OutboxTransaction`].
pub struct TransactionalAppender {
    state: Arc<Mutex<TxState>>,
}

#[async_trait]
impl Appender for TransactionalAppender {
    async fn append(&self, input: EventRecordInput) -> Result<EventRecord, AppendError> {
        let record = EventRecord::assign(input);
        let mut state = self.state.lock().await;
        match &mut *state {
            TxState::Open(staged) => {
                staged.push(record.clone());
                Ok(record)
            }
            TxState::Closed => Err(AppendError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::{Error, Result as EventResult};
    use crate::store::InMemoryOutboxStore;
    use crate::types::{AggregateType, EventId, EventName};

    fn input(aggregate_id: &str) -> EventRecordInput {
        EventRecordInput::new(
            EventName::parse("chat.message.created").unwrap(),
            AggregateType::Message,
            aggregate_id,
        )
    }

    /// Store whose appends always fail, for the best-effort path.
    struct BrokenStore;

    #[async_trait]
    impl OutboxStore for BrokenStore {
        async fn append(&self, _record: EventRecord) -> EventResult<()> {
            Err(Error::store_failed("append", "connection lost"))
        }

        async fn append_batch(&self, _records: Vec<EventRecord>) -> EventResult<()> {
            Err(Error::store_failed("append_batch", "connection lost"))
        }

        async fn fetch_unpublished(&self, _limit: usize) -> EventResult<Vec<EventRecord>> {
            Ok(Vec::new())
        }

        async fn mark_published(&self, _id: EventId) -> EventResult<()> {
            Ok(())
        }

        async fn count(&self) -> EventResult<usize> {
            Ok(0)
        }

        async fn published_count(&self) -> EventResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_best_effort_append_lands_in_store() {
        let store = InMemoryOutboxStore::new_arc();
        let appender = BestEffortAppender::new(store.clone());

        let record = appender.append(input("m1")).await.unwrap();
        assert_eq!(record.aggregate_id, "m1");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_best_effort_swallows_store_failure() {
        let appender = BestEffortAppender::new(Arc::new(BrokenStore));

        // The business operation must still see success.
        let record = appender.append(input("m1")).await.unwrap();
        assert_eq!(record.aggregate_id, "m1");
    }

    #[tokio::test]
    async fn test_transactional_commit_writes_batch() {
        let store = InMemoryOutboxStore::new_arc();
        let tx = OutboxTransaction::new();
        let appender = tx.appender();

        appender.append(input("m1")).await.unwrap();
        appender.append(input("m2")).await.unwrap();
        assert_eq!(tx.staged_len().await, 2);
        assert_eq!(store.count().await.unwrap(), 0, "nothing visible pre-commit");

        let committed = tx.commit(store.as_ref()).await.unwrap();
        assert_eq!(committed.len(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_transactional_commit_failure_propagates() {
        let tx = OutboxTransaction::new();
        tx.appender().append(input("m1")).await.unwrap();

        let err = tx.commit(&BrokenStore).await.unwrap_err();
        assert!(matches!(err, AppendError::Store(_)));
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_records() {
        let store = InMemoryOutboxStore::new_arc();
        let tx = OutboxTransaction::new();
        let appender = tx.appender();
        appender.append(input("m1")).await.unwrap();

        tx.rollback().await;
        assert_eq!(store.count().await.unwrap(), 0);

        // The detached appender now refuses new records.
        let err = appender.append(input("m2")).await.unwrap_err();
        assert!(matches!(err, AppendError::Closed));
    }

    #[tokio::test]
    async fn test_append_after_commit_is_rejected() {
        let store = InMemoryOutboxStore::new_arc();
        let tx = OutboxTransaction::new();
        let appender = tx.appender();
        appender.append(input("m1")).await.unwrap();
        tx.commit(store.as_ref()).await.unwrap();

        let err = appender.append(input("m2")).await.unwrap_err();
        assert!(matches!(err, AppendError::Closed));
    }
}
