//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the game server behavior.

use crate::error::ServerError;
use crate::transport::TransportOptions;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 42000;

/// Which transport binding carries client connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Newline-delimited lines over raw TCP.
    #[default]
    Tcp,
    /// One line per websocket text frame.
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::WebSocket => "ws",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportKind::Tcp),
            "ws" | "websocket" => Ok(TransportKind::WebSocket),
            other => Err(ServerError::Config(format!(
                "unknown transport '{other}', expected 'tcp' or 'ws'"
            ))),
        }
    }
}

/// Configuration structure for the game server.
///
/// Contains the listening address, the size of the lobby pool and the
/// deadlines and buffer sizes applied to every connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Number of lobbies in the pool, fixed for the server's lifetime
    pub lobbies: usize,

    /// Transport binding used by [`GameServer::start`](crate::GameServer::start)
    pub transport: TransportKind,

    /// Limit on each direction of the greeting exchange
    pub handshake_timeout: Duration,

    /// Socket read and write deadline
    pub io_timeout: Duration,

    /// Capacity of each connection's inbound and outbound queues
    pub queue_capacity: usize,

    /// Listen backlog, also the number of accepted connections that may wait
    /// for the dispatcher
    pub accept_backlog: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            lobbies: 2,
            transport: TransportKind::Tcp,
            handshake_timeout: Duration::from_secs(60),
            io_timeout: Duration::from_secs(60),
            queue_capacity: 10,
            accept_backlog: 100,
        }
    }
}

impl ServerConfig {
    /// Checks that the configuration can run a server.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.lobbies == 0 {
            return Err(ServerError::Config("at least one lobby is required".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ServerError::Config("queue capacity must be positive".to_string()));
        }
        if self.accept_backlog == 0 || i32::try_from(self.accept_backlog).is_err() {
            return Err(ServerError::Config(format!(
                "accept backlog must be between 1 and {}",
                i32::MAX
            )));
        }
        if self.handshake_timeout.is_zero() || self.io_timeout.is_zero() {
            return Err(ServerError::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            io_timeout: self.io_timeout,
            queue_capacity: self.queue_capacity,
        }
    }

    /// Listen backlog in the form the socket layer takes.
    pub fn listen_backlog(&self) -> i32 {
        i32::try_from(self.accept_backlog).unwrap_or(i32::MAX)
    }
}
