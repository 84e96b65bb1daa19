//! Per-connection handling: greeting exchange and lobby assignment.

use crate::connection::{Conn, Inbound};
use crate::error::{ConnError, HandshakeError};
use crate::lobby::{Lobby, LobbyId};
use crate::protocol::GREETING;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

/// The fixed set of lobbies a server hands connections to.
///
/// The scan for a free lobby runs under a single lock so two connections
/// never pick from the pool at the same time. Seating a player happens
/// outside it.
#[derive(Debug)]
pub struct LobbyPool {
    lobbies: Vec<Arc<Lobby>>,
    scan: Mutex<()>,
}

impl LobbyPool {
    /// Builds `size` lobbies with ids `0..size`.
    pub fn new(size: usize) -> Self {
        Self {
            lobbies: (0..size).map(|id| Arc::new(Lobby::new(id))).collect(),
            scan: Mutex::new(()),
        }
    }

    pub fn lobbies(&self) -> &[Arc<Lobby>] {
        &self.lobbies
    }

    pub fn get(&self, id: LobbyId) -> Option<&Arc<Lobby>> {
        self.lobbies.get(id)
    }

    /// Number of lobbies accepting players right now.
    pub fn available(&self) -> usize {
        self.lobbies.iter().filter(|lobby| lobby.is_available()).count()
    }

    /// The first lobby accepting players, in pool order.
    pub async fn find_available(&self) -> Option<Arc<Lobby>> {
        let _scan = self.scan.lock().await;
        self.lobbies.iter().find(|lobby| lobby.is_available()).cloned()
    }
}

/// Sends the greeting and waits for the client to echo it.
///
/// Each direction gets `limit` on its own.
pub async fn handshake(conn: &mut Conn, limit: Duration) -> Result<(), HandshakeError> {
    timeout(limit, conn.send(GREETING))
        .await
        .map_err(|_| HandshakeError::Timeout(limit))?
        .map_err(|_| HandshakeError::Disconnected)?;

    match timeout(limit, conn.receive())
        .await
        .map_err(|_| HandshakeError::Timeout(limit))?
    {
        Inbound::Line(line) if line == GREETING => Ok(()),
        Inbound::Line(line) => Err(HandshakeError::Mismatch(line)),
        Inbound::Disconnected => Err(HandshakeError::Disconnected),
    }
}

/// Runs one accepted connection through the greeting and into a lobby.
/// Connections that fail any step are closed.
pub(crate) async fn handle_connection(
    mut conn: Conn,
    pool: Arc<LobbyPool>,
    handshake_timeout: Duration,
) {
    if let Err(e) = handshake(&mut conn, handshake_timeout).await {
        info!("🤝 Handshake failed: {}", e);
        discard(conn);
        return;
    }
    debug!("🤝 Handshake complete");

    let Some(lobby) = pool.find_available().await else {
        info!("No lobby available, turning client away");
        discard(conn);
        return;
    };

    let lobby_id = lobby.id();
    match lobby.add_player(conn).await {
        Ok(seat) => debug!(lobby = lobby_id, seat, "Client seated"),
        Err(e) => info!("Could not seat client: {}", e),
    }
}

fn discard(conn: Conn) {
    match conn.close() {
        Ok(()) => {}
        Err(ConnError::AlreadyClosed) => debug!("Connection was already closed"),
        Err(e) => debug!("Close failed: {}", e),
    }
}
