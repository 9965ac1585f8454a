//! Realtime fanout gateway for the epop event pipeline.
//!
//! Consumes the full `epop.*` topic namespace from the bus, routes each
//! event record to rooms derived from its foreign-key ids, and delivers a
//! normalized envelope to joined websocket connections under both wire
//! spellings of the event name. Also serves the client command protocol:
//! join/leave plus debounced typing indicators.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod commands;
pub mod envelope;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod room;
pub mod server;
pub mod typing;

// Re-export main types
pub use commands::{ClientCommand, ServerMessage};
pub use envelope::{wire_names, Envelope};
pub use error::{GatewayError, Result};
pub use fanout::{ConnectionId, ConnectionRegistry, Emission};
pub use gateway::Gateway;
pub use room::{target_rooms, RoomKey};
pub use typing::{TypingTracker, DEFAULT_TYPING_COOLDOWN};
