//! Event Record: the immutable fact describing one committed state change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{AggregateType, EventId, EventName};

/// Schema version stamped on every payload.
pub const PAYLOAD_VERSION: u16 = 1;

/// Entity-specific delta carried by an event.
///
/// The foreign-key ids are first-class fields because the fanout gateway
/// routes on them; everything else rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_id: Option<String>,
    /// Correlation id supplied by the originating request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Remaining entity-specific fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventPayload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message id.
    pub fn with_message(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Set the chat id.
    pub fn with_chat(mut self, id: impl Into<String>) -> Self {
        self.chat_id = Some(id.into());
        self
    }

    /// Set the project id.
    pub fn with_project(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Set the user id.
    pub fn with_user(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    /// Set the task id.
    pub fn with_task(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    /// Set the file id.
    pub fn with_file(mut self, id: impl Into<String>) -> Self {
        self.file_id = Some(id.into());
        self
    }

    /// Set the mail id.
    pub fn with_mail(mut self, id: impl Into<String>) -> Self {
        self.mail_id = Some(id.into());
        self
    }

    /// Set the request correlation id.
    pub fn with_request(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Attach an arbitrary extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Every entity id referenced by this payload, de-duplicated,
    /// in a fixed field order (message, chat, project, user, task,
    /// file, mail).
    pub fn referenced_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for id in [
            &self.message_id,
            &self.chat_id,
            &self.project_id,
            &self.user_id,
            &self.task_id,
            &self.file_id,
            &self.mail_id,
        ]
        .into_iter()
        .flatten()
        {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// Caller-supplied input for an append. Id, timestamp and version are
/// assigned by the outbox at append time.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecordInput {
    pub name: EventName,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    /// Acting principal, absent for system-generated events.
    pub user_id: Option<String>,
    pub payload: EventPayload,
}

impl EventRecordInput {
    /// Create a new input with an empty payload.
    pub fn new(
        name: EventName,
        aggregate_type: AggregateType,
        aggregate_id: impl Into<String>,
    ) -> Self {
        Self {
            name,
            aggregate_type,
            aggregate_id: aggregate_id.into(),
            user_id: None,
            payload: EventPayload::new(),
        }
    }

    /// Set the acting principal.
    pub fn by_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// The unit of distribution. Immutable once appended; delivered at least
/// once to every subscribed process, so `id` is the consumer-side
/// de-duplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: EventId,
    pub name: EventName,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub version: u16,
    pub payload: EventPayload,
}

impl EventRecord {
    /// Assign a fresh id, timestamp and schema version to an input.
    pub fn assign(input: EventRecordInput) -> Self {
        Self {
            id: EventId::new(),
            name: input.name,
            aggregate_type: input.aggregate_type,
            aggregate_id: input.aggregate_id,
            user_id: input.user_id,
            timestamp: Utc::now(),
            version: PAYLOAD_VERSION,
            payload: input.payload,
        }
    }

    /// The bus topic this record is published to.
    pub fn topic(&self) -> String {
        self.name.topic()
    }

    /// Every entity id the record references: the payload ids plus the
    /// aggregate id, de-duplicated.
    pub fn referenced_ids(&self) -> Vec<String> {
        let mut ids = self.payload.referenced_ids();
        if !ids.contains(&self.aggregate_id) {
            ids.push(self.aggregate_id.clone());
        }
        ids
    }
}
