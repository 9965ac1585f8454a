//! Connection registry and room fanout.
//!
//! Each gateway instance tracks only its own sockets. Every instance
//! receives every bus event and fans out to locally joined connections, so
//! horizontal scaling needs no shared registry. Nothing here is persisted:
//! a restart drops membership and clients rejoin on reconnect.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use epop_events::EventRecord;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};
use ulid::Ulid;

use crate::envelope::{wire_names, Envelope};
use crate::error::{GatewayError, Result};
use crate::room::{target_rooms, RoomKey};

/// Gateway-local identifier for one websocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Ulid);

impl ConnectionId {
    fn new() -> Self {
        Self(Ulid::new())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outgoing frame: a wire event name plus its JSON data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emission {
    pub event: String,
    pub data: serde_json::Value,
}

struct Connection {
    sender: mpsc::UnboundedSender<Emission>,
    rooms: HashSet<RoomKey>,
}

/// Registry of live connections and their room membership.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a connection; emissions go to `sender`.
    pub async fn register(&self, sender: mpsc::UnboundedSender<Emission>) -> ConnectionId {
        let id = ConnectionId::new();
        let mut connections = self.connections.write().await;
        connections.insert(
            id,
            Connection {
                sender,
                rooms: HashSet::new(),
            },
        );
        id
    }

    /// Drop a connection and all of its membership.
    pub async fn deregister(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        connections.remove(&id);
    }

    /// Join a room. Idempotent: joining twice is a no-op.
    pub async fn join(&self, id: ConnectionId, room: RoomKey) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get_mut(&id) {
            conn.rooms.insert(room);
        }
    }

    /// Leave a room. Leaving a room never joined is a no-op.
    pub async fn leave(&self, id: ConnectionId, room: &RoomKey) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get_mut(&id) {
            conn.rooms.remove(room);
        }
    }

    /// Room membership of one connection.
    pub async fn rooms_of(&self, id: ConnectionId) -> HashSet<RoomKey> {
        let connections = self.connections.read().await;
        connections
            .get(&id)
            .map(|c| c.rooms.clone())
            .unwrap_or_default()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Fan an event record out to every connection joined to any of its
    /// target rooms.
    ///
    /// The envelope is built once and emitted under both wire names. A
    /// connection joined to several target rooms still receives each
    /// emission exactly once. Returns the number of connections reached.
    pub async fn dispatch(&self, record: &EventRecord, received: DateTime<Utc>) -> Result<usize> {
        let rooms = target_rooms(record);
        let envelope = Envelope::from_record_at(record, received);
        let data = serde_json::to_value(&envelope)
            .map_err(|e| GatewayError::Serialization(e.to_string()))?;
        let names = wire_names(&record.name);

        let reached = self
            .emit(|conn| rooms.iter().any(|r| conn.rooms.contains(r)), &names, &data)
            .await;

        debug!(
            event_id = %record.id,
            name = %record.name,
            rooms = rooms.len(),
            reached,
            "dispatched event"
        );
        Ok(reached)
    }

    /// Broadcast arbitrary data to one room under the given wire names.
    /// Used by the typing-indicator path.
    pub async fn broadcast_to_room(
        &self,
        room: &RoomKey,
        names: &[String; 2],
        data: serde_json::Value,
    ) -> usize {
        self.emit(|conn| conn.rooms.contains(room), names, &data).await
    }

    async fn emit<F>(&self, interested: F, names: &[String; 2], data: &serde_json::Value) -> usize
    where
        F: Fn(&Connection) -> bool,
    {
        let mut reached = 0;
        let mut dead = Vec::new();

        {
            let connections = self.connections.read().await;
            for (id, conn) in connections.iter() {
                if !interested(conn) {
                    continue;
                }
                let mut delivered = true;
                for event in names {
                    let emission = Emission {
                        event: event.clone(),
                        data: data.clone(),
                    };
                    if conn.sender.send(emission).is_err() {
                        delivered = false;
                        break;
                    }
                }
                if delivered {
                    reached += 1;
                } else {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            trace!(count = dead.len(), "pruning dead connections");
            let mut connections = self.connections.write().await;
            for id in dead {
                connections.remove(&id);
            }
        }

        reached
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use epop_events::{AggregateType, EventName, EventPayload, EventRecordInput};

    use super::*;

    fn chat_message(chat_id: &str) -> EventRecord {
        EventRecord::assign(
            EventRecordInput::new(
                EventName::parse("chat.message.created").unwrap(),
                AggregateType::Message,
                "m1",
            )
            .with_payload(EventPayload::new().with_message("m1").with_chat(chat_id)),
        )
    }

    fn task_moved(project_id: &str, user_id: &str) -> EventRecord {
        EventRecord::assign(
            EventRecordInput::new(
                EventName::parse("project.task.moved").unwrap(),
                AggregateType::Task,
                "t1",
            )
            .with_payload(
                EventPayload::new()
                    .with_task("t1")
                    .with_project(project_id)
                    .with_user(user_id),
            ),
        )
    }

    async fn connect(registry: &ConnectionRegistry) -> (ConnectionId, mpsc::UnboundedReceiver<Emission>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;
        (id, rx)
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry).await;

        registry.join(id, RoomKey::chat("c1")).await;
        registry.join(id, RoomKey::chat("c1")).await;

        assert_eq!(registry.rooms_of(id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_leave_unjoined_room_is_noop() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry).await;

        registry.leave(id, &RoomKey::chat("c1")).await;
        assert!(registry.rooms_of(id).await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_only_reaches_joined_connections() {
        let registry = ConnectionRegistry::new();
        let (joined, mut joined_rx) = connect(&registry).await;
        let (_other, mut other_rx) = connect(&registry).await;
        registry.join(joined, RoomKey::chat("c1")).await;

        let reached = registry
            .dispatch(&chat_message("c1"), Utc::now())
            .await
            .unwrap();

        assert_eq!(reached, 1);
        assert!(joined_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_emits_both_wire_names() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry).await;
        registry.join(id, RoomKey::chat("c1")).await;

        registry
            .dispatch(&chat_message("c1"), Utc::now())
            .await
            .unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.event, "chat.message.created");
        assert_eq!(second.event, "chat:message_created");
        assert_eq!(first.data, second.data, "identical envelope content");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_duplicate_delivery_when_joined_to_both_rooms() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry).await;
        registry.join(id, RoomKey::project("p1")).await;
        registry.join(id, RoomKey::user("u2")).await;

        let reached = registry
            .dispatch(&task_moved("p1", "u2"), Utc::now())
            .await
            .unwrap();

        assert_eq!(reached, 1);
        // Exactly one emission per wire name, despite two matching rooms.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_reaches_either_room() {
        let registry = ConnectionRegistry::new();
        let (in_project, mut project_rx) = connect(&registry).await;
        let (assignee, mut user_rx) = connect(&registry).await;
        registry.join(in_project, RoomKey::project("p1")).await;
        registry.join(assignee, RoomKey::user("u2")).await;

        let reached = registry
            .dispatch(&task_moved("p1", "u2"), Utc::now())
            .await
            .unwrap();

        assert_eq!(reached, 2);
        assert!(project_rx.try_recv().is_ok());
        assert!(user_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_dead_connections_are_pruned() {
        let registry = ConnectionRegistry::new();
        let (id, rx) = connect(&registry).await;
        registry.join(id, RoomKey::chat("c1")).await;
        drop(rx);

        let reached = registry
            .dispatch(&chat_message("c1"), Utc::now())
            .await
            .unwrap();

        assert_eq!(reached, 0);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_envelope_ids_on_the_wire() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry).await;
        registry.join(id, RoomKey::chat("c1")).await;

        registry
            .dispatch(&chat_message("c1"), Utc::now())
            .await
            .unwrap();

        let emission = rx.try_recv().unwrap();
        assert_eq!(emission.data["ids"], serde_json::json!(["m1", "c1"]));
    }
}
