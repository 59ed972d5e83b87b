//! ChatServer listener loop
//!
//! Accepts connections, registers each socket and spawns its session worker.
//! A [`ServerHandle`] stops the loop from another thread; `run` then hands
//! over to the [`ShutdownCoordinator`].

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::SessionWorker;
use crate::registry::Registry;
use crate::session::SessionSocket;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};

/// Stops a running [`ChatServer`] from any thread
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Request shutdown; the listener notices within one poll interval
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Shutdown requested for server on {}", self.local_addr);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// The chat server
pub struct ChatServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    config: ServerConfig,
    running: Arc<AtomicBool>,
}

impl ChatServer {
    /// Bind the listening socket
    pub fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(config.socket_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(Registry::with_capacity(config.max_clients)),
            config,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: Arc::clone(&self.running),
            local_addr: self.local_addr,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until shutdown is requested, then tear down
    pub fn run(self) -> ShutdownReport {
        info!("ChatServer started");

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.accept_connection(stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.config.accept_poll());
                }
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        error!("Failed to accept client connection: {}", e);
                    }
                    thread::sleep(self.config.accept_poll());
                }
            }
        }

        info!("ChatServer shutting down");
        drop(self.listener);
        let report = ShutdownCoordinator::new(self.config.join_timeout()).shutdown(&self.registry);
        info!("Server shutdown complete");
        report
    }

    fn accept_connection(&self, stream: TcpStream, addr: SocketAddr) {
        info!("New client connection from {}", addr);

        if let Err(e) = stream.set_nonblocking(false) {
            error!("Failed to configure socket for {}: {}", addr, e);
            return;
        }

        let socket = Arc::new(SessionSocket::new(stream));
        let id = match self.registry.add(Arc::clone(&socket)) {
            Ok(id) => id,
            Err(e) => {
                warn!("Rejecting connection from {}: {}", addr, e);
                socket.close();
                return;
            }
        };

        let worker = SessionWorker::new(id, Arc::clone(&socket), Arc::clone(&self.registry));
        let spawned = thread::Builder::new()
            .name(format!("session-{}", id))
            .spawn(move || {
                worker.run();
            });

        match spawned {
            Ok(handle) => {
                if self.registry.attach_worker(id, handle).is_err() {
                    debug!("Session {} ended before its worker was attached", id);
                }
                info!(
                    "Session {} added successfully. Active sessions: {}",
                    id,
                    self.registry.count()
                );
            }
            Err(e) => {
                error!("Failed to spawn worker for session {}: {}", id, e);
                if let Ok(session) = self.registry.remove(id) {
                    session.close();
                }
            }
        }
    }
}
