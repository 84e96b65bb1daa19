use crate::connection::{Conn, Inbound};
use crate::protocol::{Command, ErrorResponse};
use crate::tokens::Token;
use tracing::{debug, info};

/// A connection seated in a lobby.
///
/// Sends are best effort: a player whose transport is gone simply stops
/// receiving, and the game finds out on the next read.
#[derive(Debug)]
pub struct Player {
    seat: usize,
    token: Token,
    conn: Conn,
}

impl Player {
    pub(crate) fn new(seat: usize, token: Token, conn: Conn) -> Self {
        Self { seat, token, conn }
    }

    pub fn seat(&self) -> usize {
        self.seat
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub(crate) async fn send(&self, command: Command) {
        if let Err(e) = self.conn.send(command.to_string()).await {
            debug!(seat = self.seat, %command, "Dropped message: {}", e);
        }
    }

    pub(crate) async fn reject(&self, response: ErrorResponse) {
        if let Err(e) = self.conn.send(response.as_str()).await {
            debug!(seat = self.seat, %response, "Dropped error response: {}", e);
        }
    }

    pub(crate) async fn receive(&mut self) -> Inbound {
        self.conn.receive().await
    }

    /// Sends the removal marker and releases the connection. The transport
    /// flushes anything still queued before the marker.
    pub(crate) async fn remove(self, reason: &str) {
        info!(seat = self.seat, token = %self.token, conn = self.conn.id(), reason, "Removing player");
        if let Err(e) = self.conn.send_removed().await {
            debug!(seat = self.seat, "Removal marker not delivered: {}", e);
        }
    }
}
