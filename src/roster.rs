//! User-list payload
//!
//! A roster travels as a sequence of NUL-terminated strings: the literal
//! header `"Users"` followed by one entry per named session. The last entry's
//! own terminator ends the payload.

use crate::error::ProtocolError;
use crate::types::MAX_MESSAGE_LEN;

/// Literal first string of every user-list payload
pub const ROSTER_HEADER: &str = "Users";

/// Largest encoded roster; entries that would not fit are dropped
pub const ROSTER_CAPACITY: usize = MAX_MESSAGE_LEN;

/// Smallest valid payload: the header and its terminator
const MIN_ROSTER_LEN: usize = ROSTER_HEADER.len() + 1;

/// Ordered list of named users
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    users: Vec<String>,
}

impl Roster {
    pub fn new(users: Vec<String>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn into_users(self) -> Vec<String> {
        self.users
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.users.iter().any(|u| u == nickname)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Serialize into the wire form
    ///
    /// Stops at the first entry that would overflow [`ROSTER_CAPACITY`]
    /// (one byte is kept spare, as the fixed buffer always ends in NUL).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ROSTER_CAPACITY);
        buf.extend_from_slice(ROSTER_HEADER.as_bytes());
        buf.push(0);

        for user in &self.users {
            if buf.len() + user.len() + 1 >= ROSTER_CAPACITY {
                break;
            }
            buf.extend_from_slice(user.as_bytes());
            buf.push(0);
        }
        buf
    }

    /// Parse the wire form
    ///
    /// An empty string ends the list; a missing terminator on the last entry
    /// is tolerated.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < MIN_ROSTER_LEN {
            return Err(ProtocolError::MalformedPayload(format!(
                "user list too short: {} bytes",
                payload.len()
            )));
        }

        let mut entries = payload.split(|b| *b == 0);
        match entries.next() {
            Some(header) if header == ROSTER_HEADER.as_bytes() => {}
            _ => {
                return Err(ProtocolError::MalformedPayload(
                    "user list missing 'Users' header".to_string(),
                ))
            }
        }

        let users = entries
            .take_while(|entry| !entry.is_empty())
            .map(|entry| String::from_utf8_lossy(entry).into_owned())
            .collect();
        Ok(Self { users })
    }
}

impl FromIterator<String> for Roster {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
