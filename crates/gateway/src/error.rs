//! Error types for the fanout gateway.

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error type.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Client sent a command the gateway cannot parse.
    #[error("bad command: {0}")]
    BadCommand(String),

    /// Delivering to a connection failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Envelope serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}
