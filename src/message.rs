//! Message protocol definitions
//!
//! Stable numeric type tags and status codes, plus the `Message` tagged
//! variant with one constructor per message kind. Byte layouts live in
//! [`crate::codec`].

use serde::{Deserialize, Serialize};

use crate::error::{NicknameError, ProtocolError};
use crate::roster::Roster;

/// Wire type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Nickname = 1,
    NicknameResponse = 2,
    Chat = 3,
    UserJoin = 4,
    UserLeave = 5,
    UserList = 6,
    Disconnect = 7,
    /// Reserved, unused by the chat core
    Register = 8,
    /// Reserved, unused by the chat core
    RegisterResponse = 9,
    /// Reserved, unused by the chat core
    Login = 10,
    /// Reserved, unused by the chat core
    LoginResponse = 11,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Nickname),
            2 => Ok(MessageType::NicknameResponse),
            3 => Ok(MessageType::Chat),
            4 => Ok(MessageType::UserJoin),
            5 => Ok(MessageType::UserLeave),
            6 => Ok(MessageType::UserList),
            7 => Ok(MessageType::Disconnect),
            8 => Ok(MessageType::Register),
            9 => Ok(MessageType::RegisterResponse),
            10 => Ok(MessageType::Login),
            11 => Ok(MessageType::LoginResponse),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    Error = 1,
    NicknameTaken = 2,
    InvalidCredentials = 3,
    UserLoggedIn = 4,
    UserExists = 5,
}

impl TryFrom<u8> for StatusCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(StatusCode::Success),
            1 => Ok(StatusCode::Error),
            2 => Ok(StatusCode::NicknameTaken),
            3 => Ok(StatusCode::InvalidCredentials),
            4 => Ok(StatusCode::UserLoggedIn),
            5 => Ok(StatusCode::UserExists),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }
}

/// One decoded protocol message
///
/// Text fields hold the logical string; fixed widths and terminators are
/// applied by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client asks to claim a nickname
    NicknameRequest { nickname: String },
    /// Server verdict on a nickname request, also used for size rejections
    NicknameResponse { status: StatusCode, message: String },
    /// Chat line; `username` is the sender as seen by recipients
    Chat { username: String, message: String },
    /// A user claimed a nickname
    UserJoin { username: String },
    /// A named user disconnected
    UserLeave { username: String },
    /// Current roster of named users
    UserList(Roster),
    /// Orderly close
    Disconnect,
    Register { username: String, password: String },
    RegisterResponse { status: StatusCode, message: String },
    Login { username: String, password: String },
    LoginResponse { status: StatusCode, message: String },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::NicknameRequest { .. } => MessageType::Nickname,
            Message::NicknameResponse { .. } => MessageType::NicknameResponse,
            Message::Chat { .. } => MessageType::Chat,
            Message::UserJoin { .. } => MessageType::UserJoin,
            Message::UserLeave { .. } => MessageType::UserLeave,
            Message::UserList(_) => MessageType::UserList,
            Message::Disconnect => MessageType::Disconnect,
            Message::Register { .. } => MessageType::Register,
            Message::RegisterResponse { .. } => MessageType::RegisterResponse,
            Message::Login { .. } => MessageType::Login,
            Message::LoginResponse { .. } => MessageType::LoginResponse,
        }
    }

    /// Build a nickname response
    pub fn response(status: StatusCode, message: impl Into<String>) -> Self {
        Message::NicknameResponse {
            status,
            message: message.into(),
        }
    }

    /// Build a `STATUS_ERROR` rejection
    pub fn rejection(message: impl Into<String>) -> Self {
        Self::response(StatusCode::Error, message)
    }
}

/// Convert a nickname validation failure into the rejection sent to the peer
impl From<NicknameError> for Message {
    fn from(err: NicknameError) -> Self {
        Message::rejection(err.to_string())
    }
}
