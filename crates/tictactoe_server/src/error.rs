//! Error types for the server, its transports and its lobbies.
//!
//! Transport failures never reach game logic as errors: a lobby only ever
//! sees a connection's queues close or its disconnect signal arrive. The
//! types here are for the callers that own those layers.

use crate::lobby::LobbyId;
use std::io;
use thiserror::Error;

/// Errors returned by [`GameServer`](crate::GameServer) operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration cannot produce a working server
    #[error("Configuration error: {0}")]
    Config(String),
    /// Network-level failure outside any single connection
    #[error("Network error: {0}")]
    Network(String),
    /// The listener stopped with an unrecoverable error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// Internal server error (task failure, invalid state)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures of a listener or its sockets.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("accept error (unrecoverable): {0}")]
    Accept(#[source] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Errors raised by a [`Conn`](crate::connection::Conn).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnError {
    /// `close` was called on a connection that is already closed.
    #[error("repeated call to close")]
    AlreadyClosed,
    /// The transport side of the queue is gone.
    #[error("connection queue closed")]
    Closed,
}

/// Reasons a connection fails the greeting exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("peer did not complete the greeting within {0:?}")]
    Timeout(std::time::Duration),
    #[error("peer answered the greeting with {0:?}")]
    Mismatch(String),
    #[error("peer disconnected during the greeting")]
    Disconnected,
}

/// Reasons a lobby refuses a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// The lobby is full or already has a game running.
    #[error("lobby {0} is not available")]
    Unavailable(LobbyId),
    /// No free seat was left when the player was placed.
    #[error("lobby {0} has no free seat")]
    Full(LobbyId),
}
