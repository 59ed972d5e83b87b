//! Session definitions
//!
//! Represents one accepted connection: its socket, identity and nickname.

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::codec;
use crate::error::ProtocolError;
use crate::message::Message;
use crate::types::{Nickname, SessionId};

/// Lifecycle of a session as seen by its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no nickname yet
    Connected,
    /// Nickname claimed
    Active,
    /// Cleanup in progress
    Disconnecting,
    /// Terminal
    Disconnected,
}

/// Shared handle to a session's TCP stream
///
/// The worker reads through it, broadcasts write through it and shutdown
/// closes it. Writes are serialized so frames from concurrent senders never
/// interleave on the wire.
#[derive(Debug)]
pub struct SessionSocket {
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    write_lock: Mutex<()>,
}

impl SessionSocket {
    pub fn new(stream: TcpStream) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream,
            peer_addr,
            write_lock: Mutex::new(()),
        }
    }

    /// Send one message as a single write
    pub fn send(&self, msg: &Message) -> Result<(), ProtocolError> {
        let frame = codec::encode(msg)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        (&self.stream).write_all(&frame)?;
        Ok(())
    }

    /// Stream used by the owning worker for reads
    pub fn reader(&self) -> &TcpStream {
        &self.stream
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Shut down both halves, unblocking any pending read
    pub fn close(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Socket shutdown for {:?} failed: {}", self.peer_addr, e);
        }
    }
}

/// Server-side record of one connected, possibly named client
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Nickname (None before a successful claim)
    pub nickname: Option<Nickname>,
    /// Socket shared with the worker and broadcasters
    pub socket: Arc<SessionSocket>,
    /// Worker thread, attached right after spawn
    pub worker: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(id: SessionId, socket: Arc<SessionSocket>) -> Self {
        Self {
            id,
            nickname: None,
            socket,
            worker: None,
        }
    }

    /// Check if this session has claimed a nickname
    pub fn is_named(&self) -> bool {
        self.nickname.is_some()
    }

    /// Get the display name for this session
    pub fn display_name(&self) -> &str {
        self.nickname.as_ref().map(Nickname::as_str).unwrap_or("(unnamed)")
    }

    /// Close the socket and detach the worker thread
    pub fn close(mut self) {
        self.socket.close();
        // Dropping an unfinished handle detaches the thread
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() && worker.join().is_err() {
                warn!("Worker for session {} panicked", self.id);
            }
        }
    }
}
