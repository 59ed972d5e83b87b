//! Client events
//!
//! The receiver loop produces typed events into a channel; the surrounding
//! UI layer drains it. Events serialize as tagged JSON for consumers that sit
//! outside the process.

use serde::Serialize;

use crate::message::{Message, StatusCode};

/// Username shown on locally generated alerts
pub const SYSTEM_USERNAME: &str = "System";

/// Protocol event delivered to the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Server verdict on our nickname request
    NicknameResponse { status: StatusCode, message: String },
    /// Chat line, including server notices
    Chat { username: String, message: String },
    /// Another user claimed a nickname
    UserJoined { username: String },
    /// A named user left
    UserLeft { username: String },
    /// Roster of named users
    UserList { users: Vec<String> },
    /// Connection ended; sent at most once per connection
    Disconnected,
    /// Local notice about connection trouble or a failed send
    Alert { message: String },
}

impl ClientEvent {
    pub fn alert(message: impl Into<String>) -> Self {
        ClientEvent::Alert {
            message: message.into(),
        }
    }

    /// Map a server message to the event it raises, if any
    pub fn from_message(msg: Message) -> Option<Self> {
        let event = match msg {
            Message::NicknameResponse { status, message } => {
                ClientEvent::NicknameResponse { status, message }
            }
            Message::Chat { username, message } => ClientEvent::Chat { username, message },
            Message::UserJoin { username } => ClientEvent::UserJoined { username },
            Message::UserLeave { username } => ClientEvent::UserLeft { username },
            Message::UserList(roster) => ClientEvent::UserList {
                users: roster.into_users(),
            },
            Message::Disconnect => ClientEvent::Disconnected,
            Message::NicknameRequest { .. }
            | Message::Register { .. }
            | Message::RegisterResponse { .. }
            | Message::Login { .. }
            | Message::LoginResponse { .. } => return None,
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Roster;

    #[test]
    fn test_event_serialize() {
        let event = ClientEvent::Chat {
            username: "Ann".to_string(),
            message: "hi".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"chat\""));
        assert!(json.contains("\"username\":\"Ann\""));

        let json = serde_json::to_string(&ClientEvent::Disconnected).unwrap();
        assert_eq!(json, r#"{"type":"disconnected"}"#);
    }

    #[test]
    fn test_from_message() {
        let roster = Roster::new(vec!["Ann".to_string()]);
        assert_eq!(
            ClientEvent::from_message(Message::UserList(roster)),
            Some(ClientEvent::UserList {
                users: vec!["Ann".to_string()]
            })
        );
        assert_eq!(
            ClientEvent::from_message(Message::NicknameRequest {
                nickname: "x".to_string()
            }),
            None
        );
    }
}
