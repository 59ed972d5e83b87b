//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: monotonic per-process session identifier
//! - `Nickname`: a validated display name (2..=31 bytes)

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::NicknameError;

/// Default TCP port of the chat server
pub const DEFAULT_PORT: u16 = 54321;

/// Width of every nickname/username field on the wire, terminator included
pub const MAX_USERNAME_LEN: usize = 32;

/// Width of every chat/status text field on the wire, terminator included
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Width of the password field used by the reserved register/login payloads
pub const MAX_PASSWORD_LEN: usize = 64;

/// Shortest nickname the server accepts
pub const MIN_NICKNAME_LEN: usize = 2;

/// Longest nickname that fits its field
pub const MAX_NICKNAME_LEN: usize = MAX_USERNAME_LEN - 1;

/// Unique session identifier (newtype pattern)
///
/// Assigned at accept time and never reused for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic source of [`SessionId`]s, starting at 1
#[derive(Debug)]
pub struct SessionIdGenerator(AtomicU64);

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next_id(&self) -> SessionId {
        SessionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A nickname that passed length validation
///
/// Length is measured in bytes, matching the fixed-width field it travels in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nickname(String);

impl Nickname {
    /// Validate a candidate nickname
    pub fn parse(candidate: &str) -> Result<Self, NicknameError> {
        if candidate.len() < MIN_NICKNAME_LEN {
            return Err(NicknameError::TooShort);
        }
        if candidate.len() > MAX_NICKNAME_LEN {
            return Err(NicknameError::TooLong);
        }
        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
