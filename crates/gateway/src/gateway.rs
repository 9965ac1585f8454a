//! Gateway core: bus consumption, command handling and typing broadcasts.

use std::sync::Arc;

use chrono::Utc;
use epop_events::{BusSubscription, EventName, EventRecord, TopicBus, TopicPattern, TOPIC_PREFIX};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::commands::{ClientCommand, ServerMessage};
use crate::envelope::wire_names;
use crate::error::{GatewayError, Result};
use crate::fanout::{ConnectionId, ConnectionRegistry};
use crate::room::RoomKey;
use crate::typing::TypingTracker;

/// The fanout gateway.
///
/// Consumes every pipeline topic from the bus, routes records to rooms, and
/// serves the client command protocol. The typing tracker is injected so
/// tests can control its cooldown.
pub struct Gateway {
    registry: Arc<ConnectionRegistry>,
    typing: TypingTracker,
    bus: Arc<TopicBus>,
}

impl Gateway {
    /// Gateway wired to a bus, with injected registry and typing tracker.
    pub fn new(bus: Arc<TopicBus>, registry: Arc<ConnectionRegistry>, typing: TypingTracker) -> Self {
        Self {
            registry,
            typing,
            bus,
        }
    }

    /// The connection registry backing this gateway.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Subscribe to the pipeline topic namespace.
    ///
    /// The subscription starts at "now": records published while this
    /// instance was down are not replayed.
    pub async fn subscribe(&self) -> (String, BusSubscription) {
        self.bus
            .subscribe(TopicPattern::wildcard(&format!("{TOPIC_PREFIX}*")))
            .await
    }

    /// Consume the bus until it closes, dispatching each record to rooms.
    ///
    /// An unparseable payload is logged and dropped; it never takes the
    /// consume loop down.
    pub async fn run(&self, mut subscription: BusSubscription) {
        info!("gateway consuming pipeline topics");
        while let Ok(message) = subscription.recv().await {
            self.handle_raw(&message.topic, &message.payload).await;
        }
        info!("bus closed, gateway consume loop ending");
    }

    /// Handle one raw bus payload.
    pub async fn handle_raw(&self, topic: &str, payload: &str) {
        let record: EventRecord = match serde_json::from_str(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(%topic, error = %e, "dropping unparseable bus payload");
                return;
            }
        };
        if let Err(e) = self.registry.dispatch(&record, Utc::now()).await {
            warn!(%topic, event_id = %record.id, error = %e, "dispatch failed");
        }
    }

    /// Apply one client command for a connection.
    pub async fn apply_command(
        &self,
        connection: ConnectionId,
        command: ClientCommand,
    ) -> Result<Option<ServerMessage>> {
        match command {
            ClientCommand::JoinChat { id } => self.join(connection, RoomKey::chat(id)).await,
            ClientCommand::LeaveChat { id } => self.leave(connection, RoomKey::chat(id)).await,
            ClientCommand::JoinProject { id } => self.join(connection, RoomKey::project(id)).await,
            ClientCommand::LeaveProject { id } => {
                self.leave(connection, RoomKey::project(id)).await
            }
            ClientCommand::JoinUser { id } => self.join(connection, RoomKey::user(id)).await,
            ClientCommand::LeaveUser { id } => self.leave(connection, RoomKey::user(id)).await,
            ClientCommand::TypingStart {
                chat_id,
                user_id,
                user_name,
            } => {
                if self.typing.note_start(&chat_id, &user_id).await {
                    self.broadcast_typing(
                        "chat.typing.started",
                        &chat_id,
                        &user_id,
                        user_name.as_deref(),
                    )
                    .await?;
                }
                Ok(None)
            }
            ClientCommand::TypingStop { chat_id, user_id } => {
                self.typing.note_stop(&chat_id, &user_id).await;
                self.broadcast_typing("chat.typing.stopped", &chat_id, &user_id, None)
                    .await?;
                Ok(None)
            }
        }
    }

    /// Handle a raw command frame from a socket. Parse failures come back
    /// as an error message for the client instead of dropping the socket.
    pub async fn apply_raw_command(
        &self,
        connection: ConnectionId,
        raw: &str,
    ) -> Option<ServerMessage> {
        match self.try_apply_raw(connection, raw).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(%connection, error = %e, "command rejected");
                Some(ServerMessage::Error {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn try_apply_raw(
        &self,
        connection: ConnectionId,
        raw: &str,
    ) -> Result<Option<ServerMessage>> {
        let command: ClientCommand = serde_json::from_str(raw)
            .map_err(|e| GatewayError::BadCommand(format!("invalid command: {e}")))?;
        self.apply_command(connection, command).await
    }

    async fn join(&self, connection: ConnectionId, room: RoomKey) -> Result<Option<ServerMessage>> {
        let rendered = room.to_string();
        self.registry.join(connection, room).await;
        debug!(%connection, room = %rendered, "joined room");
        Ok(Some(ServerMessage::Joined { room: rendered }))
    }

    async fn leave(
        &self,
        connection: ConnectionId,
        room: RoomKey,
    ) -> Result<Option<ServerMessage>> {
        let rendered = room.to_string();
        self.registry.leave(connection, &room).await;
        debug!(%connection, room = %rendered, "left room");
        Ok(Some(ServerMessage::Left { room: rendered }))
    }

    async fn broadcast_typing(
        &self,
        name: &str,
        chat_id: &str,
        user_id: &str,
        user_name: Option<&str>,
    ) -> Result<()> {
        let name = EventName::parse(name).map_err(|e| GatewayError::Internal(e.to_string()))?;
        let mut data = json!({
            "chatId": chat_id,
            "userId": user_id,
            "ts": Utc::now(),
        });
        if let (Some(obj), Some(user_name)) = (data.as_object_mut(), user_name) {
            obj.insert("userName".to_string(), json!(user_name));
        }
        let reached = self
            .registry
            .broadcast_to_room(&RoomKey::chat(chat_id), &wire_names(&name), data)
            .await;
        debug!(%name, %chat_id, %user_id, reached, "typing broadcast");
        Ok(())
    }
}
