//! Multi-user TCP Chat Library
//!
//! A chat server and client network layer speaking a length-prefixed binary
//! protocol over TCP.
//!
//! # Features
//! - Framed wire protocol: `[type:1][length:4 BE][payload]`
//! - Nickname claiming with server-side uniqueness
//! - Chat broadcast to every named user
//! - Join/leave notifications and roster refreshes
//! - Bounded-time graceful shutdown
//! - Client receiver thread delivering typed events
//!
//! # Architecture
//! Thread-per-connection with shared state behind one lock:
//! - `ChatServer` accepts connections and spawns a `SessionWorker` each
//! - `Registry` is the fixed-capacity session table
//! - `Broadcaster` snapshots recipients under the lock and writes after
//!   releasing it
//! - `ChatClient` runs one receiver thread and reports through a channel
//!
//! # Example
//! ```ignore
//! use std::thread;
//! use tcp_chat::{ChatServer, ServerConfig};
//!
//! let server = ChatServer::bind(ServerConfig::default())?;
//! let handle = server.handle();
//! let worker = thread::spawn(move || server.run());
//!
//! // ... later
//! handle.shutdown();
//! let report = worker.join().unwrap();
//! ```

pub mod broadcast;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod message;
pub mod registry;
pub mod roster;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod types;

// Re-export main types for convenience
pub use broadcast::Broadcaster;
pub use client::ChatClient;
pub use config::{ClientArgs, ClientConfig, ServerConfig};
pub use error::{AppError, ClientError, ConfigError, NicknameError, ProtocolError, RegistryError};
pub use event::ClientEvent;
pub use handler::SessionWorker;
pub use message::{Message, MessageType, StatusCode};
pub use registry::Registry;
pub use roster::Roster;
pub use server::{ChatServer, ServerHandle};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use types::{Nickname, SessionId};
