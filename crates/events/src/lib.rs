//! Domain-event distribution primitives for the epop collaboration suite.
//!
//! A state change committed by a business service becomes an immutable
//! [`EventRecord`], lands in the outbox atomically with the mutation that
//! produced it, and is relayed at least once onto a topic bus from which
//! fanout gateways deliver it to interested connections. Key pieces:
//!
//! - **Event records**: `<domain>.<entity>.<action>`-named facts with the
//!   foreign-key ids the gateway routes on
//! - **Outbox writer**: transactional and best-effort append variants
//! - **Topic bus**: wildcard-pattern pub/sub over JSON records
//! - **Relay**: polls the outbox and publishes, preserving per-aggregate
//!   append order
//!
//! # Example
//!
//! ```ignore
//! use epop_events::{
//!     AggregateType, Appender, BestEffortAppender, EventName, EventPayload,
//!     EventRecordInput, InMemoryOutboxStore, Relay, TopicBus, TopicPattern,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryOutboxStore::new_arc();
//!     let bus = TopicBus::new_arc();
//!     let (_, mut sub) = bus.subscribe(TopicPattern::wildcard("epop.*")).await;
//!
//!     let appender = BestEffortAppender::new(store.clone());
//!     let input = EventRecordInput::new(
//!         EventName::parse("chat.message.created").unwrap(),
//!         AggregateType::Message,
//!         "m1",
//!     )
//!     .with_payload(EventPayload::new().with_chat("c1"));
//!     appender.append(input).await.unwrap();
//!
//!     Relay::new(store, bus).drain().await.unwrap();
//!     let msg = sub.recv().await.unwrap();
//!     println!("relayed to {}", msg.topic);
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bus;
pub mod error;
pub mod outbox;
pub mod record;
pub mod relay;
pub mod store;
pub mod types;

// Re-export main types
pub use bus::{BusMessage, BusSubscription, CircuitBreaker, Publisher, TopicBus, TopicBusBuilder, TopicPattern};
pub use error::{Error, Result};
pub use outbox::{AppendError, Appender, BestEffortAppender, OutboxTransaction, TransactionalAppender};
pub use record::{EventPayload, EventRecord, EventRecordInput, PAYLOAD_VERSION};
pub use relay::{PublishRetryPolicy, Relay};
pub use store::{InMemoryOutboxStore, OutboxStore};
pub use types::{AggregateType, EventId, EventName, TempId, TOPIC_PREFIX};
