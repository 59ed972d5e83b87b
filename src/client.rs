//! Client network layer
//!
//! Mirrors the server's session worker: one background thread decodes
//! inbound frames and turns them into [`ClientEvent`]s, while sends happen on
//! the caller's thread. Connection state lives behind one lock and is copied
//! out before any blocking call.

use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::ClientConfig;
use crate::error::{ClientError, ProtocolError};
use crate::event::ClientEvent;
use crate::message::{Message, StatusCode};
use crate::types::Nickname;

#[derive(Debug, Default)]
struct Connection {
    /// Present while connected
    socket: Option<Arc<TcpStream>>,
    /// Server accepted our nickname
    named: bool,
    /// Last nickname we asked for
    nickname: Option<String>,
}

struct Shared {
    config: ClientConfig,
    state: Mutex<Connection>,
    receiving: AtomicBool,
    events: Sender<ClientEvent>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, Connection> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn socket(&self) -> Option<Arc<TcpStream>> {
        self.state().socket.clone()
    }

    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    fn alert(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.emit(ClientEvent::alert(message));
    }

    /// Drop the socket and reset naming; true if we were connected
    fn close_connection(&self) -> bool {
        let socket = {
            let mut state = self.state();
            state.named = false;
            state.socket.take()
        };
        match socket {
            Some(socket) => {
                let _ = socket.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }

    /// Close after a transport failure, raising `Disconnected` exactly once
    fn connection_lost(&self, reason: &str) {
        if self.close_connection() {
            self.alert(reason);
            self.emit(ClientEvent::Disconnected);
        }
    }

    /// Handle one server message; false ends the receive loop
    fn dispatch(&self, msg: Message) -> bool {
        match msg {
            Message::NicknameResponse { status, message } => {
                info!("Received nickname response: {}", message);
                if status == StatusCode::Success {
                    self.state().named = true;
                    self.emit(ClientEvent::NicknameResponse { status, message });
                    return true;
                }

                warn!("Nickname rejected by server: {}", message);
                self.alert(format!("Connection rejected: {}", message));
                self.emit(ClientEvent::NicknameResponse { status, message });
                if self.close_connection() {
                    self.emit(ClientEvent::Disconnected);
                }
                false
            }
            Message::Disconnect => {
                info!("Received disconnect message from server");
                if self.close_connection() {
                    self.emit(ClientEvent::Disconnected);
                }
                false
            }
            other => {
                let kind = other.message_type();
                match ClientEvent::from_message(other) {
                    Some(event) => {
                        debug!("Received {:?}", kind);
                        self.emit(event);
                    }
                    None => warn!("Received unexpected message type: {:?}", kind),
                }
                true
            }
        }
    }
}

fn receive_loop(shared: Arc<Shared>) {
    while shared.receiving.load(Ordering::SeqCst) {
        let Some(socket) = shared.socket() else {
            shared.alert("Connection lost: Socket closed or not connected");
            break;
        };

        let mut reader = &*socket;
        let (header, decoded) = match codec::read_message(&mut reader) {
            Ok(frame) => frame,
            Err(e) if e.is_timeout() => continue,
            Err(e) => {
                if !shared.receiving.load(Ordering::SeqCst) {
                    break;
                }
                let reason = match e {
                    ProtocolError::ConnectionClosed => "Connection closed by server".to_string(),
                    other => format!("Connection error: Failed to receive data from server ({})", other),
                };
                shared.connection_lost(&reason);
                break;
            }
        };

        let msg = match decoded {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping malformed frame of type {}: {}", header.tag, e);
                continue;
            }
        };
        if !shared.dispatch(msg) {
            break;
        }
    }

    shared.receiving.store(false, Ordering::SeqCst);
    info!("Receive thread stopped");
}

/// Client side of the chat protocol
pub struct ChatClient {
    shared: Arc<Shared>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl ChatClient {
    /// Create a disconnected client and the channel its events arrive on
    pub fn new(config: ClientConfig) -> (Self, Receiver<ClientEvent>) {
        let (events, rx) = mpsc::channel();
        let client = Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(Connection::default()),
                receiving: AtomicBool::new(false),
                events,
            }),
            receiver: Mutex::new(None),
        };
        (client, rx)
    }

    fn receiver(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.receiver.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a connection and start the receiver thread
    ///
    /// `server` is either `ip:port` or a bare IP/host using the configured port.
    pub fn connect(&self, server: &str) -> Result<(), ClientError> {
        if self.is_connected() {
            warn!("Already connected to server");
            return Ok(());
        }

        let addr = self.resolve(server).inspect_err(|_| {
            self.shared.alert("Invalid server IP address");
        })?;
        let stream = TcpStream::connect(addr).inspect_err(|_| {
            self.shared.alert("Failed to connect to server");
        })?;
        if let Err(e) = stream.set_read_timeout(Some(self.shared.config.receive_timeout())) {
            warn!("Failed to set socket receive timeout: {}", e);
        }

        {
            let mut state = self.shared.state();
            if state.socket.is_some() {
                warn!("Already connected to server");
                return Ok(());
            }
            *state = Connection {
                socket: Some(Arc::new(stream)),
                named: false,
                nickname: None,
            };
        }
        info!("Connected to server at {}", addr);

        self.start_receiving()
    }

    /// Connect and claim a nickname as one operation
    ///
    /// The name is validated before any network I/O. If the request cannot be
    /// sent the connection is torn down again.
    pub fn connect_with_nickname(&self, server: &str, nickname: &str) -> Result<(), ClientError> {
        if let Err(e) = Nickname::parse(nickname) {
            self.shared.alert(format!("Connection failed: {}", e));
            return Err(e.into());
        }

        self.connect(server)?;

        if let Err(e) = self.set_nickname(nickname) {
            self.shared.alert("Failed to set nickname after connecting");
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Send a nickname request; the verdict arrives as an event
    pub fn set_nickname(&self, nickname: &str) -> Result<(), ClientError> {
        let nickname = Nickname::parse(nickname).inspect_err(|e| {
            error!("Invalid nickname '{}': {}", nickname, e);
        })?;

        let socket = {
            let mut state = self.shared.state();
            let socket = state.socket.clone().ok_or(ClientError::NotConnected)?;
            state.nickname = Some(nickname.as_str().to_string());
            socket
        };

        let request = Message::NicknameRequest {
            nickname: nickname.into_string(),
        };
        codec::write_message(&mut &*socket, &request).inspect_err(|e| {
            error!("Failed to send nickname request: {}", e);
        })?;
        info!("Nickname request sent");
        Ok(())
    }

    /// Send a chat line under our accepted nickname
    pub fn send_chat(&self, text: &str) -> Result<(), ClientError> {
        let (socket, username) = {
            let state = self.shared.state();
            match (&state.socket, state.named, &state.nickname) {
                (Some(socket), true, Some(nickname)) => (Arc::clone(socket), nickname.clone()),
                (None, _, _) => return Err(ClientError::NotConnected),
                _ => return Err(ClientError::NicknameRequired),
            }
        };

        let msg = Message::Chat {
            username,
            message: text.to_string(),
        };
        if let Err(e) = codec::write_message(&mut &*socket, &msg) {
            self.shared.alert(format!("Failed to send message: {}", e));
            return Err(e.into());
        }
        Ok(())
    }

    /// Start the receiver thread for the current connection
    pub fn start_receiving(&self) -> Result<(), ClientError> {
        let mut slot = self.receiver();
        if self.shared.receiving.load(Ordering::SeqCst) {
            warn!("Receive thread already running");
            return Ok(());
        }
        if let Some(previous) = slot.take() {
            let _ = previous.join();
        }
        if !self.is_connected() {
            warn!("Not connected to server");
            return Err(ClientError::NotConnected);
        }

        self.shared.receiving.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("chat-receiver".to_string())
            .spawn(move || receive_loop(shared))
            .inspect_err(|_| self.shared.receiving.store(false, Ordering::SeqCst))?;
        *slot = Some(handle);
        info!("Started receive thread");
        Ok(())
    }

    /// Stop the receiver: shut down the read half to unblock it, then join
    pub fn stop_receiving(&self) {
        let handle = {
            let mut slot = self.receiver();
            self.shared.receiving.store(false, Ordering::SeqCst);
            if let Some(socket) = self.shared.socket() {
                let _ = socket.shutdown(Shutdown::Read);
            }
            slot.take()
        };

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            match handle.join() {
                Ok(()) => info!("Stopped receive thread"),
                Err(_) => warn!("Receive thread panicked"),
            }
        }
    }

    /// Stop receiving, tell the server we are leaving and close the socket
    pub fn disconnect(&self) {
        self.stop_receiving();

        let socket = {
            let mut state = self.shared.state();
            state.named = false;
            state.socket.take()
        };
        if let Some(socket) = socket {
            if let Err(e) = codec::write_message(&mut &*socket, &Message::Disconnect) {
                debug!("Disconnect notice not sent: {}", e);
            }
            let _ = socket.shutdown(Shutdown::Both);
            info!("Disconnected from server");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state().socket.is_some()
    }

    pub fn has_nickname(&self) -> bool {
        self.shared.state().named
    }

    pub fn nickname(&self) -> Option<String> {
        self.shared.state().nickname.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    fn resolve(&self, server: &str) -> Result<SocketAddr, ClientError> {
        if let Ok(addr) = server.parse::<SocketAddr>() {
            return Ok(addr);
        }
        if let Ok(ip) = server.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.shared.config.server_port));
        }
        (server, self.shared.config.server_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no address for {}", server),
                ))
            })
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
