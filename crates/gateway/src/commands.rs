//! Client-to-gateway command protocol.

use serde::{Deserialize, Serialize};

/// Commands a connected client may send over the socket.
///
/// Tagged by `type`; the typing variants also accept their dotted wire
/// aliases so either client generation can speak to the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinChat { id: String },
    LeaveChat { id: String },
    JoinProject { id: String },
    LeaveProject { id: String },
    JoinUser { id: String },
    LeaveUser { id: String },

    /// The user started typing in a chat.
    #[serde(rename_all = "camelCase", alias = "typing.start")]
    TypingStart {
        chat_id: String,
        user_id: String,
        #[serde(default)]
        user_name: Option<String>,
    },

    /// The user stopped typing in a chat.
    #[serde(rename_all = "camelCase", alias = "typing.stop")]
    TypingStop { chat_id: String, user_id: String },
}

/// Control messages the gateway sends back outside the event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Joined { room: String },
    #[serde(rename_all = "camelCase")]
    Left { room: String },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_join_commands_parse() {
        let chat: ClientCommand =
            serde_json::from_str(r#"{"type":"join_chat","id":"c1"}"#).unwrap();
        assert_eq!(chat, ClientCommand::JoinChat { id: "c1".into() });

        let project: ClientCommand =
            serde_json::from_str(r#"{"type":"leave_project","id":"p1"}"#).unwrap();
        assert_eq!(project, ClientCommand::LeaveProject { id: "p1".into() });

        let user: ClientCommand =
            serde_json::from_str(r#"{"type":"join_user","id":"u1"}"#).unwrap();
        assert_eq!(user, ClientCommand::JoinUser { id: "u1".into() });
    }

    #[test]
    fn test_typing_start_parses_with_alias() {
        let canonical: ClientCommand =
            serde_json::from_str(r#"{"type":"typing_start","chatId":"c1","userId":"u1"}"#).unwrap();
        let aliased: ClientCommand =
            serde_json::from_str(r#"{"type":"typing.start","chatId":"c1","userId":"u1"}"#).unwrap();
        assert_eq!(canonical, aliased);
        assert_eq!(
            canonical,
            ClientCommand::TypingStart {
                chat_id: "c1".into(),
                user_id: "u1".into(),
                user_name: None,
            }
        );
    }

    #[test]
    fn test_typing_start_carries_optional_user_name() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"typing.start","chatId":"c1","userId":"u1","userName":"Ada"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::TypingStart {
                chat_id: "c1".into(),
                user_id: "u1".into(),
                user_name: Some("Ada".into()),
            }
        );
    }

    #[test]
    fn test_typing_stop_alias() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"typing.stop","chatId":"c1","userId":"u1"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::TypingStop {
                chat_id: "c1".into(),
                user_id: "u1".into(),
            }
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result: std::result::Result<ClientCommand, _> =
            serde_json::from_str(r#"{"type":"subscribe","id":"c1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_shape() {
        let json = serde_json::to_value(ServerMessage::Joined { room: "chat:c1".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "joined", "room": "chat:c1"}));
    }
}
