//! Error types for the chat server and client
//!
//! Defines protocol, registry, validation, client and configuration errors.
//! Uses thiserror for ergonomic error definitions.

use std::io;

use thiserror::Error;

use crate::types::SessionId;

/// Application-level errors on the server path
#[derive(Debug, Error)]
pub enum AppError {
    /// Socket creation/bind/accept failure (fatal to that operation)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing or payload error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Registry rejected the operation
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while encoding, decoding or transporting frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared or requested payload exceeds the protocol cap
    #[error("payload too large: {length} bytes (maximum {max})")]
    PayloadTooLarge { length: usize, max: usize },

    /// Type tag does not name any known message
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Status byte does not name any known status
    #[error("unknown status code: {0}")]
    UnknownStatus(u8),

    /// Payload does not match the layout of its message type
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Byte slice ends before the frame does
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// Peer closed the stream (zero-byte read)
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Underlying socket error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// True for receive-timeout errors that only mean "no data yet"
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Registry operation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot is occupied
    #[error("registry full ({capacity} sessions)")]
    CapacityExceeded { capacity: usize },

    /// No live session has this id
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// Another named session already holds this nickname
    #[error("nickname '{0}' is already in use")]
    NicknameTaken(String),
}

/// Nickname validation failures
///
/// The display strings are sent verbatim to the peer.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum NicknameError {
    #[error("Nickname too short (minimum 2 characters)")]
    TooShort,

    #[error("Nickname too long (maximum 31 characters)")]
    TooLong,
}

/// Client network layer errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nickname failed local validation; no network I/O was attempted
    #[error("invalid nickname: {0}")]
    InvalidNickname(#[from] NicknameError),

    /// Operation needs an open connection
    #[error("not connected to server")]
    NotConnected,

    /// Chat requires an accepted nickname
    #[error("nickname not set")]
    NicknameRequired,

    /// Socket failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("missing value for {0}")]
    MissingValue(&'static str),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
