//! Error types for the client transport.

use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport error type.
///
/// Connection drops are not errors here; the transport reports them over
/// its status channel and reconnects.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Establishing a connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
}
