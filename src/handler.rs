//! Session worker
//!
//! One thread per accepted connection: reads frames, validates their size
//! before parsing, and drives the registry and broadcaster through the
//! `Connected → Active → Disconnecting → Disconnected` state machine.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::codec::{self, FrameHeader, CHAT_SIZE, NICKNAME_REQUEST_SIZE};
use crate::error::{ProtocolError, RegistryError};
use crate::message::{Message, MessageType, StatusCode};
use crate::registry::Registry;
use crate::session::{SessionSocket, SessionState};
use crate::types::{Nickname, SessionId, MAX_MESSAGE_LEN, MAX_USERNAME_LEN};

/// Accepted payload size range for one type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    pub min: usize,
    pub max: usize,
}

impl PayloadLimits {
    /// Limits applied by the server before parsing a payload
    pub fn for_tag(tag: u8) -> Self {
        match MessageType::try_from(tag) {
            Ok(MessageType::Nickname) => Self {
                min: NICKNAME_REQUEST_SIZE,
                max: NICKNAME_REQUEST_SIZE + 32,
            },
            Ok(MessageType::Chat) => Self {
                min: CHAT_SIZE,
                max: MAX_USERNAME_LEN + MAX_MESSAGE_LEN + 64,
            },
            Ok(MessageType::Disconnect) => Self { min: 0, max: 8 },
            _ => Self {
                min: 0,
                max: MAX_MESSAGE_LEN,
            },
        }
    }

    /// Rejection text for a length outside the range, if any
    pub fn check(&self, length: usize) -> Option<&'static str> {
        if length < self.min {
            Some("Message too small")
        } else if length > self.max {
            Some("Message too large")
        } else {
            None
        }
    }
}

/// What the read loop does after one frame
enum Flow {
    Continue,
    Disconnect,
}

/// Per-connection state machine
pub struct SessionWorker {
    id: SessionId,
    socket: Arc<SessionSocket>,
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    state: SessionState,
    nickname: Option<Nickname>,
}

impl SessionWorker {
    pub fn new(id: SessionId, socket: Arc<SessionSocket>, registry: Arc<Registry>) -> Self {
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        Self {
            id,
            socket,
            registry,
            broadcaster,
            state: SessionState::Connected,
            nickname: None,
        }
    }

    /// Run the read loop until the peer leaves or the stream fails, then clean up
    pub fn run(mut self) -> SessionState {
        info!(
            "Worker started for session {} ({:?})",
            self.id,
            self.socket.peer_addr()
        );

        loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Disconnect) => break,
                Err(ProtocolError::ConnectionClosed) => {
                    info!("Session {} disconnected", self.id);
                    break;
                }
                Err(e) => {
                    warn!("Session {} receive error: {}", self.id, e);
                    break;
                }
            }
        }

        self.disconnect();
        self.state
    }

    /// Read and handle one frame
    fn step(&mut self) -> Result<Flow, ProtocolError> {
        let mut reader = self.socket.reader();
        let header = codec::read_header(&mut reader)?;
        debug!(
            "Session {}: header type={} length={}",
            self.id, header.tag, header.length
        );

        let limits = PayloadLimits::for_tag(header.tag);
        if let Some(problem) = limits.check(header.length) {
            warn!(
                "Session {} sent type {} with {} bytes (allowed {}..={})",
                self.id, header.tag, header.length, limits.min, limits.max
            );
            codec::discard_payload(&mut reader, header.length)?;
            self.reply(&Message::rejection(problem));
            return Ok(Flow::Continue);
        }

        let payload = codec::read_payload(&mut reader, header.length)?;
        match codec::decode_payload(header.tag, &payload) {
            Ok(msg) => Ok(self.handle_message(msg)),
            Err(e) => {
                self.log_undecodable(header, &e);
                Ok(Flow::Continue)
            }
        }
    }

    fn handle_message(&mut self, msg: Message) -> Flow {
        match msg {
            Message::NicknameRequest { nickname } => {
                self.handle_nickname(&nickname);
                Flow::Continue
            }
            Message::Chat { message, .. } => {
                self.handle_chat(&message);
                Flow::Continue
            }
            Message::Disconnect => {
                info!("Session {} requested disconnection", self.id);
                Flow::Disconnect
            }
            other => {
                warn!(
                    "Received unsupported message type {:?} from session {}",
                    other.message_type(),
                    self.id
                );
                Flow::Continue
            }
        }
    }

    /// Claim or change this session's nickname
    ///
    /// A named session may ask again: the new name goes through the same
    /// validation and uniqueness checks and, once claimed, replaces the old
    /// one and replays the join sequence. Asking for the name already held
    /// is answered as taken.
    fn handle_nickname(&mut self, requested: &str) {
        info!(
            "Nickname request from session {}: '{}' ({} bytes)",
            self.id,
            requested,
            requested.len()
        );

        if self.state == SessionState::Active {
            info!("Session {} renaming from {}", self.id, self.display_name());
        }

        let nickname = match Nickname::parse(requested) {
            Ok(nickname) => nickname,
            Err(e) => {
                warn!("Nickname rejected for session {}: {}", self.id, e);
                self.reply(&Message::from(e));
                return;
            }
        };

        if self.registry.is_nickname_taken(nickname.as_str()) {
            self.reject_taken(&nickname);
            return;
        }

        match self.registry.claim_nickname(self.id, &nickname) {
            Ok(()) => self.activate(nickname),
            Err(RegistryError::NicknameTaken(_)) => self.reject_taken(&nickname),
            Err(e) => warn!("Nickname claim failed for session {}: {}", self.id, e),
        }
    }

    fn reject_taken(&self, nickname: &Nickname) {
        warn!("Nickname rejected: {} already in use", nickname);
        self.reply(&Message::response(
            StatusCode::NicknameTaken,
            "Nickname is already in use",
        ));
    }

    fn activate(&mut self, nickname: Nickname) {
        self.state = SessionState::Active;
        self.reply(&Message::response(
            StatusCode::Success,
            "Nickname set successfully",
        ));

        self.broadcaster.send_notice(
            &self.socket,
            &format!(
                "Welcome to the chat server, {}! You are now fully connected.",
                nickname
            ),
        );

        let others = self.registry.other_named_count(self.id);
        if others > 0 {
            self.broadcaster
                .send_notice(&self.socket, &other_users_notice(others));
        }

        self.broadcaster.notify_join(nickname.as_str());
        self.broadcaster.push_roster(&self.socket);

        info!("Session {} nickname set to {}", self.id, nickname);
        self.nickname = Some(nickname);
    }

    fn handle_chat(&self, text: &str) {
        let Some(nickname) = &self.nickname else {
            warn!(
                "Session {} tried to send a message without setting a nickname",
                self.id
            );
            self.broadcaster.send_notice(
                &self.socket,
                "You must set a nickname before sending messages",
            );
            return;
        };

        info!("Chat message from {}: {}", nickname, text);
        self.broadcaster.broadcast_chat(nickname.as_str(), text);
    }

    /// Tear down: free the slot, close the socket, detach the thread and
    /// tell the named sessions that remain
    fn disconnect(&mut self) {
        self.state = SessionState::Disconnecting;

        match self.registry.remove(self.id) {
            Ok(session) => {
                let left = session.nickname.clone();
                session.close();
                match left {
                    Some(name) => self.broadcaster.notify_leave(name.as_str()),
                    None => {
                        let pushed = self.broadcaster.refresh_rosters();
                        if pushed > 0 {
                            info!(
                                "Broadcast updated user list after session {} disconnected",
                                self.id
                            );
                        }
                    }
                }
            }
            Err(e) => {
                // Already reaped by server shutdown
                debug!("Session {} cleanup skipped: {}", self.id, e);
                self.socket.close();
            }
        }

        self.state = SessionState::Disconnected;
        info!("Worker stopped for session {}", self.id);
    }

    fn reply(&self, msg: &Message) {
        if let Err(e) = self.socket.send(msg) {
            warn!(
                "Failed to send {:?} to session {}: {}",
                msg.message_type(),
                self.id,
                e
            );
        }
    }

    fn display_name(&self) -> &str {
        self.nickname.as_ref().map(Nickname::as_str).unwrap_or("")
    }

    fn log_undecodable(&self, header: FrameHeader, err: &ProtocolError) {
        match err {
            ProtocolError::UnknownMessageType(tag) => warn!(
                "Received unsupported message type {} from session {}",
                tag, self.id
            ),
            _ => warn!(
                "Dropping malformed type {} frame from session {}: {}",
                header.tag, self.id, err
            ),
        }
    }
}

/// Private count of other active users shown after a successful join
pub fn other_users_notice(count: usize) -> String {
    if count == 1 {
        "There is 1 other user in the chat.".to_string()
    } else {
        format!("There are {} other users in the chat.", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_per_type() {
        let nick = PayloadLimits::for_tag(MessageType::Nickname as u8);
        assert_eq!(nick, PayloadLimits { min: 32, max: 64 });

        let chat = PayloadLimits::for_tag(MessageType::Chat as u8);
        assert_eq!(chat, PayloadLimits { min: 1056, max: 1120 });

        let disconnect = PayloadLimits::for_tag(MessageType::Disconnect as u8);
        assert_eq!(disconnect, PayloadLimits { min: 0, max: 8 });

        assert_eq!(PayloadLimits::for_tag(200), PayloadLimits { min: 0, max: 1024 });
    }

    #[test]
    fn test_limit_check_messages() {
        let chat = PayloadLimits::for_tag(MessageType::Chat as u8);
        assert_eq!(chat.check(10), Some("Message too small"));
        assert_eq!(chat.check(1121), Some("Message too large"));
        assert_eq!(chat.check(1056), None);
        assert_eq!(chat.check(1120), None);
    }

    #[test]
    fn test_other_users_notice() {
        assert_eq!(other_users_notice(1), "There is 1 other user in the chat.");
        assert_eq!(other_users_notice(3), "There are 3 other users in the chat.");
    }
}
