//! Server and client configuration
//!
//! Both configs deserialize from JSON with every field optional, and can be
//! built from command-line arguments.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::registry::MAX_CLIENTS;
use crate::types::DEFAULT_PORT;

/// Server settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on
    pub bind_addr: IpAddr,
    /// TCP port (0 picks an ephemeral port)
    pub port: u16,
    /// Registry capacity
    pub max_clients: usize,
    /// Per-worker bounded join during shutdown
    pub join_timeout_ms: u64,
    /// How often the listener checks for a shutdown request
    pub accept_poll_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_clients: MAX_CLIENTS,
            join_timeout_ms: 2000,
            accept_poll_ms: 50,
        }
    }
}

impl ServerConfig {
    /// Parse `[port] [--config <file.json>]`
    ///
    /// The positional port overrides the file.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config_path = None;
        let mut port = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config_path = Some(args.next().ok_or(ConfigError::MissingValue("--config"))?)
                }
                flag if flag.starts_with("--") => {
                    return Err(ConfigError::UnknownArgument(arg));
                }
                _ if port.is_none() => port = Some(parse_port(&arg)?),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        let mut config = match config_path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        if let Some(port) = port {
            config.port = port;
        }
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }
}

/// Client network settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Port used when the address has none
    pub server_port: u16,
    /// Receive timeout that keeps the receiver loop responsive to stop requests
    pub receive_timeout_ms: u64,
    /// Text-only presentation requested; no protocol effect
    pub fallback: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_PORT,
            receive_timeout_ms: 500,
            fallback: false,
        }
    }
}

impl ClientConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Parsed client command line: `[--fallback] [--port N] <server-ip> <nickname>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientArgs {
    pub config: ClientConfig,
    pub server: String,
    pub nickname: String,
}

impl ClientArgs {
    pub fn parse<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = ClientConfig::default();
        let mut positional = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--fallback" => config.fallback = true,
                "--port" => {
                    let value = args.next().ok_or(ConfigError::MissingValue("--port"))?;
                    config.server_port = parse_port(&value)?;
                }
                flag if flag.starts_with("--") => {
                    return Err(ConfigError::UnknownArgument(arg));
                }
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let server = positional
            .next()
            .ok_or(ConfigError::MissingValue("server address"))?;
        let nickname = positional
            .next()
            .ok_or(ConfigError::MissingValue("nickname"))?;
        if let Some(extra) = positional.next() {
            return Err(ConfigError::UnknownArgument(extra));
        }

        Ok(Self {
            config,
            server,
            nickname,
        })
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(value.to_string())),
    }
}
