//! Client-side building blocks for the epop event pipeline.
//!
//! Two concerns live here:
//!
//! - **Resilient transport**: a reconnecting connection over a pluggable
//!   [`Connector`], with jittered exponential backoff and a shared
//!   reference-counted handle so many consumers ride one connection.
//! - **Reconciliation**: optimistic inserts over a paginated cache, with
//!   idempotent confirmation that absorbs the response-versus-fanout race.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod backoff;
pub mod cache;
pub mod error;
pub mod reconcile;
pub mod transport;

// Re-export main types
pub use backoff::BackoffPolicy;
pub use cache::{PageCache, Speculative, SpeculativeStatus};
pub use error::{Result, TransportError};
pub use reconcile::{Identify, ReconcileManager, PENDING_GC_FLOOR};
pub use transport::{
    ConnectionStatus, Connector, Credentials, ResilientTransport, Session, SharedTransport,
    TransportHandle,
};
