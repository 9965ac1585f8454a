//! Topic-based pub/sub bus carrying JSON-serialized event records.
//!
//! Delivery is fan-out to every subscriber whose pattern matches the topic;
//! a per-subscriber circuit breaker keeps one dead consumer from degrading
//! the publish path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// One message on the bus: a topic plus a JSON-serialized event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
}

/// Subscription filter over topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPattern {
    /// Match one topic exactly.
    Exact(String),
    /// Match every topic with the given prefix.
    Prefix(String),
}

impl TopicPattern {
    /// Parse a pattern string; a trailing `*` makes it a prefix match
    /// (`epop.*` matches every pipeline topic).
    pub fn wildcard(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    /// Check whether a topic matches this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Exact(t) => topic == t,
            Self::Prefix(p) => topic.starts_with(p.as_str()),
        }
    }
}

/// Circuit breaker to prevent a dead subscriber from eating publishes.
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    threshold: u32,
}

impl CircuitBreaker {
    /// Create a breaker with the given consecutive-failure threshold.
    pub fn new(threshold: u32) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            threshold,
        }
    }

    /// Check if a send should be attempted.
    pub fn allow_request(&self) -> bool {
        self.failure_count.load(Ordering::Relaxed) < self.threshold
    }

    /// Record a successful send.
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Record a failed send.
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

struct Subscriber {
    sender: broadcast::Sender<BusMessage>,
    pattern: TopicPattern,
    breaker: Arc<CircuitBreaker>,
}

/// Handle for receiving matched bus messages.
pub struct BusSubscription {
    receiver: broadcast::Receiver<BusMessage>,
}

impl BusSubscription {
    /// Receive the next message.
    ///
    /// A lagging receiver skips the dropped messages and keeps going;
    /// `Err(ChannelClosed)` only means the bus side is gone.
    pub async fn recv(&mut self) -> Result<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Ok(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription lagged, dropping missed messages");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(Error::ChannelClosed),
            }
        }
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<BusMessage> {
        self.receiver.try_recv().map_err(|_| Error::ChannelClosed)
    }
}

/// Something event records can be published to.
///
/// The relay publishes through this seam so tests can inject transient
/// failures.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one JSON payload to a topic.
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}

/// Topic-based pub/sub bus.
pub struct TopicBus {
    subscribers: RwLock<HashMap<String, Subscriber>>,
    next_id: RwLock<u64>,
    channel_capacity: usize,
    failure_threshold: u32,
}

impl TopicBus {
    /// Create a bus with default capacity and breaker threshold.
    pub fn new() -> Self {
        TopicBusBuilder::new().build()
    }

    /// Create a bus wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Subscribe to topics matching a pattern.
    pub async fn subscribe(&self, pattern: TopicPattern) -> (String, BusSubscription) {
        let (sender, receiver) = broadcast::channel(self.channel_capacity);

        let mut next_id = self.next_id.write().await;
        let id = format!("sub_{}", *next_id);
        *next_id += 1;

        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(
            id.clone(),
            Subscriber {
                sender,
                pattern,
                breaker: Arc::new(CircuitBreaker::new(self.failure_threshold)),
            },
        );

        (id, BusSubscription { receiver })
    }

    /// Remove a subscriber.
    pub async fn unsubscribe(&self, subscriber_id: &str) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.remove(subscriber_id);
    }

    /// Number of live subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for TopicBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for TopicBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };

        let subscribers = self.subscribers.read().await;
        for (_, sub) in subscribers
            .iter()
            .filter(|(_, sub)| sub.pattern.matches(topic))
        {
            if !sub.breaker.allow_request() {
                debug!(
                    topic = %topic,
                    subscriber_failures = sub.breaker.failure_count(),
                    "skipping subscriber due to circuit breaker"
                );
                continue;
            }

            match sub.sender.send(message.clone()) {
                Ok(_) => sub.breaker.record_success(),
                Err(broadcast::error::SendError(_)) => {
                    sub.breaker.record_failure();
                    debug!(topic = %topic, "failed to deliver to subscriber");
                }
            }
        }

        Ok(())
    }
}

/// Builder for [`TopicBus`].
pub struct TopicBusBuilder {
    channel_capacity: usize,
    failure_threshold: u32,
}

impl TopicBusBuilder {
    /// Create a builder with defaults.
    pub fn new() -> Self {
        Self {
            channel_capacity: 1024,
            failure_threshold: 5,
        }
    }

    /// Set the per-subscriber channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the circuit breaker failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Build the bus.
    pub fn build(self) -> TopicBus {
        TopicBus {
            subscribers: RwLock::new(HashMap::new()),
            next_id: RwLock::new(0),
            channel_capacity: self.channel_capacity,
            failure_threshold: self.failure_threshold,
        }
    }
}

impl Default for TopicBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
