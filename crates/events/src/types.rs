//! Core identifier and naming types for the event pipeline.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

/// Topic prefix shared by every published event.
pub const TOPIC_PREFIX: &str = "epop.";

/// Unique identifier for an event record.
///
/// Assigned at append time; downstream consumers use it as the
/// de-duplication key under at-least-once delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Ulid);

impl EventId {
    /// Create a new random event ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Create from a ULID.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the inner ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-local identifier for a speculative (optimistic) item.
///
/// Never reused; only meaningful on the client that generated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId(Ulid);

impl TempId {
    /// Create a new random temp ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get the inner ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    Message,
    Chat,
    Task,
    File,
    Mail,
    User,
    Project,
    Org,
}

impl AggregateType {
    /// Lowercase wire spelling, also used for fallback room keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Chat => "chat",
            Self::Task => "task",
            Self::File => "file",
            Self::Mail => "mail",
            Self::User => "user",
            Self::Project => "project",
            Self::Org => "org",
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A namespaced action identifier of the form `<domain>.<entity>.<action>`.
///
/// Validated at construction: exactly three non-empty dot segments.
/// Serialized as the dotted string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventName {
    domain: String,
    entity: String,
    action: String,
}

impl EventName {
    /// Parse a dotted event name.
    pub fn parse(name: &str) -> Result<Self> {
        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() != 3 {
            return Err(Error::invalid_name(
                name,
                "expected exactly three dot-separated segments",
            ));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::invalid_name(name, "empty segment"));
        }
        if name.contains(':') || name.chars().any(char::is_whitespace) {
            return Err(Error::invalid_name(name, "illegal character"));
        }
        Ok(Self {
            domain: segments[0].to_string(),
            entity: segments[1].to_string(),
            action: segments[2].to_string(),
        })
    }

    /// The domain segment (e.g. `chat`).
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The entity segment (e.g. `message`).
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The action segment (e.g. `created`).
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The dotted wire spelling: `domain.entity.action`.
    pub fn dotted(&self) -> String {
        format!("{}.{}.{}", self.domain, self.entity, self.action)
    }

    /// The colon wire spelling: `domain:entity_action`.
    pub fn colon_form(&self) -> String {
        format!("{}:{}_{}", self.domain, self.entity, self.action)
    }

    /// The bus topic this event is published to: `epop.<name>`.
    pub fn topic(&self) -> String {
        format!("{TOPIC_PREFIX}{}", self.dotted())
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.domain, self.entity, self.action)
    }
}

impl TryFrom<String> for EventName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.dotted()
    }
}

impl std::str::FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
