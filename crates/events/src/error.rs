//! Error types for the events crate.

use thiserror::Error;

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Event pipeline error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Outbox store operation failed.
    #[error("outbox operation '{operation}' failed: {reason}")]
    StoreFailed { operation: String, reason: String },

    /// Event not found in the outbox.
    #[error("event '{event_id}' not found")]
    EventNotFound { event_id: String },

    /// Event name is not a valid `<domain>.<entity>.<action>` triple.
    #[error("invalid event name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// Publishing to a bus topic failed.
    #[error("publish to '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// Subscription channel closed.
    #[error("event channel closed")]
    ChannelClosed,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a store failed error.
    pub fn store_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an event not found error.
    pub fn event_not_found(event_id: impl Into<String>) -> Self {
        Self::EventNotFound {
            event_id: event_id.into(),
        }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create a publish failed error.
    pub fn publish_failed(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::store_failed("append", "disk full");
        assert!(err.to_string().contains("append"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_invalid_name_display() {
        let err = Error::invalid_name("chat.message", "expected three segments");
        assert!(err.to_string().contains("chat.message"));
        assert!(err.to_string().contains("three segments"));
    }
}
