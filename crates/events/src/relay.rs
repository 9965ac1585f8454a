//! Relay worker: moves appended outbox records onto the bus.
//!
//! The relay is what decouples publication from the business request path.
//! It polls the outbox for unpublished records, publishes each to its
//! topic, then marks it published. Marking happens only after a successful
//! publish, so a crash in between re-delivers the record (at least once).
//! A pass stops at the first record whose publish retries are exhausted:
//! later records of the same pass are never published ahead of it, which is
//! what preserves per-aggregate append order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::Publisher;
use crate::error::{Error, Result};
use crate::store::OutboxStore;

/// Bounded retry schedule for a single publish attempt.
#[derive(Debug, Clone)]
pub struct PublishRetryPolicy {
    /// Attempts per record per pass.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (milliseconds).
    pub base_delay_ms: u64,
    /// Cap on the backoff delay (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for PublishRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

impl PublishRetryPolicy {
    /// Delay before retry `attempt` (0-indexed): `min(base · 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }
}

/// Asynchronous outbox-to-bus publisher.
pub struct Relay {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn Publisher>,
    policy: PublishRetryPolicy,
    batch_size: usize,
    poll_interval: Duration,
}

impl Relay {
    /// Create a relay with default policy, batch size and poll interval.
    pub fn new(store: Arc<dyn OutboxStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            store,
            publisher,
            policy: PublishRetryPolicy::default(),
            batch_size: 64,
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Set the publish retry policy.
    pub fn with_policy(mut self, policy: PublishRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the per-pass batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the poll interval for [`run`](Relay::run).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// One relay pass. Returns the number of records published and marked.
    pub async fn drain(&self) -> Result<usize> {
        let pending = self.store.fetch_unpublished(self.batch_size).await?;
        let mut published = 0;

        for record in pending {
            let topic = record.topic();
            let payload = serde_json::to_string(&record)
                .map_err(|e| Error::serialization(e.to_string()))?;

            if !self.publish_with_retry(&topic, payload).await {
                // Leave the record unpublished and stop the pass; the next
                // tick retries from the same watermark.
                warn!(
                    event_id = %record.id,
                    topic = %topic,
                    "publish retries exhausted, deferring record"
                );
                break;
            }

            self.store.mark_published(record.id).await?;
            debug!(event_id = %record.id, topic = %topic, "relayed event record");
            published += 1;
        }

        Ok(published)
    }

    async fn publish_with_retry(&self, topic: &str, payload: String) -> bool {
        for attempt in 0..self.policy.max_attempts {
            match self.publisher.publish(topic, payload.clone()).await {
                Ok(()) => return true,
                Err(e) => {
                    debug!(topic = %topic, attempt, error = %e, "publish failed");
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                }
            }
        }
        false
    }

    /// Background loop: drain every poll interval until `shutdown` flips
    /// to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "relay started"
        );
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.poll_interval) => {
                    if let Err(e) = self.drain().await {
                        warn!(error = %e, "relay pass failed");
                    }
                }
            }
        }
        info!("relay stopped");
    }
}
