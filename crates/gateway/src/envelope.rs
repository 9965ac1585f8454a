//! Outgoing event envelope and the dual wire-name table.

use chrono::{DateTime, Utc};
use epop_events::{AggregateType, EventId, EventName, EventPayload, EventRecord};
use serde::{Deserialize, Serialize};

/// Wire aliases for one canonical event identity, iterated at emission
/// time. Heterogeneous consumers listen on either the dotted form
/// (`chat.message.created`) or the colon form (`chat:message_created`);
/// every emission goes out under both.
const WIRE_ALIASES: [fn(&EventName) -> String; 2] = [EventName::dotted, EventName::colon_form];

/// Every wire spelling of an event name, in emission order.
pub fn wire_names(name: &EventName) -> [String; 2] {
    WIRE_ALIASES.map(|alias| alias(name))
}

/// The normalized gateway-to-client envelope.
///
/// Carries every Event Record field plus the merged id list and delivery
/// metadata. `actorId` and `requestId` are always present (null when
/// unknown) so consumers never branch on field existence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: EventId,
    pub name: EventName,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub version: u16,
    pub payload: EventPayload,
    /// De-duplicated list of every entity id the event references.
    pub ids: Vec<String>,
    /// Alias of `payload` kept for consumers that patch caches from it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub patch: Option<EventPayload>,
    /// Server-received time; defaults to the record's own timestamp.
    pub ts: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub request_id: Option<String>,
}

impl Envelope {
    /// Build an envelope stamped with the record's own timestamp.
    pub fn from_record(record: &EventRecord) -> Self {
        Self::from_record_at(record, record.timestamp)
    }

    /// Build an envelope stamped with an explicit receive time.
    pub fn from_record_at(record: &EventRecord, received: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            aggregate_type: record.aggregate_type,
            aggregate_id: record.aggregate_id.clone(),
            user_id: record.user_id.clone(),
            timestamp: record.timestamp,
            version: record.version,
            payload: record.payload.clone(),
            ids: record.referenced_ids(),
            patch: Some(record.payload.clone()),
            ts: received,
            actor_id: record.user_id.clone(),
            request_id: record.payload.request_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use epop_events::EventRecordInput;

    use super::*;

    fn record() -> EventRecord {
        EventRecord::assign(
            EventRecordInput::new(
                EventName::parse("chat.message.created").unwrap(),
                AggregateType::Message,
                "m1",
            )
            .by_user("u1")
            .with_payload(
                EventPayload::new()
                    .with_message("m1")
                    .with_chat("c1")
                    .with_request("req-7"),
            ),
        )
    }

    #[test]
    fn test_wire_names_both_spellings() {
        let name = EventName::parse("chat.message.created").unwrap();
        assert_eq!(
            wire_names(&name),
            ["chat.message.created".to_string(), "chat:message_created".to_string()]
        );
    }

    #[test]
    fn test_envelope_merges_ids_and_metadata() {
        let r = record();
        let env = Envelope::from_record(&r);

        assert_eq!(env.ids, vec!["m1", "c1"]);
        assert_eq!(env.actor_id.as_deref(), Some("u1"));
        assert_eq!(env.request_id.as_deref(), Some("req-7"));
        assert_eq!(env.ts, r.timestamp, "ts defaults to record timestamp");
        assert_eq!(env.patch, Some(r.payload.clone()));
    }

    #[test]
    fn test_envelope_nullable_fields_stay_present() {
        let r = EventRecord::assign(EventRecordInput::new(
            EventName::parse("org.unit.reparented").unwrap(),
            AggregateType::Org,
            "org-9",
        ));
        let env = Envelope::from_record(&r);
        let json = serde_json::to_value(&env).unwrap();

        assert!(json["actorId"].is_null());
        assert!(json["requestId"].is_null());
        assert_eq!(json["ids"], serde_json::json!(["org-9"]));
        assert!(json["ts"].is_string(), "ts serializes as ISO timestamp");
    }

    #[test]
    fn test_envelope_explicit_receive_time() {
        let r = record();
        let received = Utc::now();
        let env = Envelope::from_record_at(&r, received);
        assert_eq!(env.ts, received);
        assert_eq!(env.timestamp, r.timestamp);
    }
}
