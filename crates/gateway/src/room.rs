//! Room keys and the event-to-room router.

use epop_events::{AggregateType, EventRecord};

/// A named group of connections sharing interest in one entity.
///
/// Membership is gateway-local and ephemeral: clients rebuild it with join
/// commands after every reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Chat(String),
    Project(String),
    User(String),
    /// Fallback room for events that carry no explicit routing ids.
    Aggregate { kind: AggregateType, id: String },
}

impl RoomKey {
    /// Room for a chat.
    pub fn chat(id: impl Into<String>) -> Self {
        Self::Chat(id.into())
    }

    /// Room for a project.
    pub fn project(id: impl Into<String>) -> Self {
        Self::Project(id.into())
    }

    /// Room for a user's personal notifications.
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat(id) => write!(f, "chat:{id}"),
            Self::Project(id) => write!(f, "project:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Aggregate { kind, id } => write!(f, "{kind}:{id}"),
        }
    }
}

/// Compute the rooms an event is delivered to.
///
/// Explicit `chatId`/`projectId`/`userId` payload fields win; one event may
/// target several rooms at once (a reassigned task notifies its project room
/// and the new assignee's user room). With no explicit ids the event falls
/// back to a single room keyed by aggregate type and id.
pub fn target_rooms(record: &EventRecord) -> Vec<RoomKey> {
    let mut rooms = Vec::new();
    if let Some(id) = &record.payload.chat_id {
        rooms.push(RoomKey::Chat(id.clone()));
    }
    if let Some(id) = &record.payload.project_id {
        rooms.push(RoomKey::Project(id.clone()));
    }
    if let Some(id) = &record.payload.user_id {
        rooms.push(RoomKey::User(id.clone()));
    }
    if rooms.is_empty() {
        rooms.push(RoomKey::Aggregate {
            kind: record.aggregate_type,
            id: record.aggregate_id.clone(),
        });
    }
    rooms
}
