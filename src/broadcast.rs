//! Broadcast and notification engine
//!
//! Composes chat, join, leave and roster payloads and fans them out to
//! registry members. Recipient sockets are snapshotted under the registry
//! lock; every send happens after it is released. Delivery is best-effort:
//! a failed send is logged and never retried.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::message::Message;
use crate::registry::Registry;
use crate::session::SessionSocket;

/// Username carried by server-originated chat lines
pub const SERVER_USERNAME: &str = "Server";

/// Fan-out helper bound to one registry
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Send a chat line to every named session, sender included
    ///
    /// Returns the number of successful deliveries.
    pub fn broadcast_chat(&self, sender: &str, text: &str) -> usize {
        let msg = Message::Chat {
            username: sender.to_string(),
            message: text.to_string(),
        };
        let sockets = self.registry.snapshot_named_sockets(None);
        deliver_all(&sockets, &msg)
    }

    /// Announce `name` to every other named session, then refresh everyone's roster
    pub fn notify_join(&self, name: &str) {
        let msg = Message::UserJoin {
            username: name.to_string(),
        };
        let others = self.registry.snapshot_named_sockets_except(name);
        deliver_all(&others, &msg);
        info!("Broadcast user joined: {}", name);

        let pushed = self.refresh_rosters();
        info!(
            "Broadcast updated user list after user joined: {} ({} recipients)",
            name, pushed
        );
    }

    /// Announce that `name` left, then refresh the roster of those remaining
    ///
    /// Call after the leaver was removed from the registry.
    pub fn notify_leave(&self, name: &str) {
        let msg = Message::UserLeave {
            username: name.to_string(),
        };
        let remaining = self.registry.snapshot_named_sockets_except(name);
        if remaining.is_empty() {
            debug!("No named sessions left to notify about {}", name);
            return;
        }
        deliver_all(&remaining, &msg);
        info!("Broadcast user left: {}", name);

        let roster = Message::UserList(self.registry.build_roster());
        deliver_all(&remaining, &roster);
        info!("Broadcast updated user list after user left: {}", name);
    }

    /// Send the current roster to exactly one socket
    pub fn push_roster(&self, socket: &SessionSocket) -> bool {
        deliver(socket, &Message::UserList(self.registry.build_roster()))
    }

    /// Send the current roster to every named session
    ///
    /// Returns the number of recipients.
    pub fn refresh_rosters(&self) -> usize {
        let sockets = self.registry.snapshot_named_sockets(None);
        if sockets.is_empty() {
            return 0;
        }
        let roster = Message::UserList(self.registry.build_roster());
        deliver_all(&sockets, &roster);
        sockets.len()
    }

    /// Send a private server notice as a chat line
    pub fn send_notice(&self, socket: &SessionSocket, text: &str) -> bool {
        let msg = Message::Chat {
            username: SERVER_USERNAME.to_string(),
            message: text.to_string(),
        };
        deliver(socket, &msg)
    }
}

fn deliver(socket: &SessionSocket, msg: &Message) -> bool {
    match socket.send(msg) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "Failed to deliver {:?} to {:?}: {}",
                msg.message_type(),
                socket.peer_addr(),
                e
            );
            false
        }
    }
}

fn deliver_all(sockets: &[Arc<SessionSocket>], msg: &Message) -> usize {
    sockets.iter().filter(|s| deliver(s, msg)).count()
}
