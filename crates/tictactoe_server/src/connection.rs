//! Connection channel abstraction.
//!
//! A [`Conn`] decouples game logic from whatever transport carries a client.
//! It owns two bounded queues:
//!
//! * **outbound** (server → client): the server pushes [`Outbound`] messages,
//!   the transport's write pump drains them onto the socket.
//! * **inbound** (client → server): the transport's read pump pushes every
//!   received line, then [`Inbound::Disconnected`] once the socket is gone.
//!
//! Dropping the `Conn` (or the [`Player`](crate::lobby::Player) holding it)
//! closes the outbound queue. That is the signal for the write pump to flush
//! what is already queued and release the socket.
//!
//! The transport end of the queues is a [`ConnPump`], created together with
//! the `Conn` by [`Conn::new`].

use crate::error::ConnError;
use crate::protocol::REMOVED;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Identifies a connection within the listener that accepted it.
pub type ConnectionId = usize;

/// Messages from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A protocol line, without terminator.
    Line(String),
    /// The server is dropping this client. The write pump sends the removal
    /// marker and stops.
    Removed,
}

impl Outbound {
    /// The text that goes on the wire for this message, without terminator.
    pub fn as_line(&self) -> &str {
        match self {
            Outbound::Line(line) => line,
            Outbound::Removed => REMOVED,
        }
    }
}

/// Messages from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A line the client sent, without terminator.
    Line(String),
    /// The transport lost the client. Never produced by client data.
    Disconnected,
}

/// Shared, once-only close signal for one connection.
///
/// Both pumps and the owner of the [`Conn`] hold a clone. The first
/// [`close`](CloseHandle::close) wins; every later call reports
/// [`ConnError::AlreadyClosed`].
#[derive(Clone)]
pub struct CloseHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }

    /// Marks the connection closed and wakes everything waiting on
    /// [`closed`](CloseHandle::closed).
    pub fn close(&self) -> Result<(), ConnError> {
        let first = self.signal.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if first {
            Ok(())
        } else {
            Err(ConnError::AlreadyClosed)
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once the connection has been closed by anyone.
    pub async fn closed(&self) {
        let mut receiver = self.signal.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The game-facing end of a client connection.
#[derive(Debug)]
pub struct Conn {
    id: ConnectionId,
    peer: String,
    outbound: mpsc::Sender<Outbound>,
    inbound: mpsc::Receiver<Inbound>,
    close: CloseHandle,
}

/// The transport-facing end of a client connection.
///
/// A transport moves `outbound` into its write pump and `inbound` into its
/// read pump. Both pumps share `close`.
#[derive(Debug)]
pub struct ConnPump {
    pub id: ConnectionId,
    pub peer: String,
    pub outbound: mpsc::Receiver<Outbound>,
    pub inbound: mpsc::Sender<Inbound>,
    pub close: CloseHandle,
}

impl Conn {
    /// Creates a connection whose queues each buffer up to `capacity`
    /// messages, plus the pump end a transport drives.
    pub fn new(id: ConnectionId, peer: impl Into<String>, capacity: usize) -> (Self, ConnPump) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let close = CloseHandle::new();
        let peer = peer.into();

        let conn = Self {
            id,
            peer: peer.clone(),
            outbound: outbound_tx,
            inbound: inbound_rx,
            close: close.clone(),
        };
        let pump = ConnPump {
            id,
            peer,
            outbound: outbound_rx,
            inbound: inbound_tx,
            close,
        };
        (conn, pump)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Human-readable description of the remote end.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queues a line for the client, waiting while the queue is full.
    pub async fn send(&self, line: impl Into<String>) -> Result<(), ConnError> {
        self.outbound
            .send(Outbound::Line(line.into()))
            .await
            .map_err(|_| ConnError::Closed)
    }

    /// Queues the removal marker. Nothing sent afterwards reaches the client.
    pub async fn send_removed(&self) -> Result<(), ConnError> {
        self.outbound
            .send(Outbound::Removed)
            .await
            .map_err(|_| ConnError::Closed)
    }

    /// Waits for the next message from the client.
    ///
    /// A queue that closed without a disconnect signal is reported as
    /// [`Inbound::Disconnected`] too, so callers have a single case to handle.
    pub async fn receive(&mut self) -> Inbound {
        self.inbound.recv().await.unwrap_or(Inbound::Disconnected)
    }

    /// Forces the transport to drop the connection without flushing.
    ///
    /// Returns [`ConnError::AlreadyClosed`] if the connection was already
    /// closed, by this call or by one of the pumps.
    pub fn close(&self) -> Result<(), ConnError> {
        self.close.close()
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_is_once_only() {
        let (conn, pump) = Conn::new(7, "test", 4);
        assert!(!conn.is_closed());
        assert_eq!(conn.close(), Ok(()));
        assert!(conn.is_closed());
        assert!(pump.close.is_closed());
        assert_eq!(conn.close(), Err(ConnError::AlreadyClosed));
        assert_eq!(pump.close.close(), Err(ConnError::AlreadyClosed));
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let handle = CloseHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.closed().await })
        };
        handle.close().expect("first close succeeds");
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .expect("waiter task should not panic");

        // Late waiters see the existing state.
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.closed())
            .await
            .expect("closed() should resolve immediately");
    }

    #[tokio::test]
    async fn test_lines_flow_both_ways() {
        let (mut conn, mut pump) = Conn::new(1, "test", 4);

        conn.send("MOVE X").await.expect("queue open");
        conn.send_removed().await.expect("queue open");
        assert_eq!(pump.outbound.recv().await, Some(Outbound::Line("MOVE X".into())));
        assert_eq!(pump.outbound.recv().await.map(|m| m.as_line().to_owned()), Some("REMOVED".into()));

        pump.inbound.send(Inbound::Line("TURN X 0 0".into())).await.expect("queue open");
        assert_eq!(conn.receive().await, Inbound::Line("TURN X 0 0".into()));
    }

    #[tokio::test]
    async fn test_dropping_conn_closes_outbound_after_queued_lines() {
        let (conn, mut pump) = Conn::new(1, "test", 4);
        conn.send("TICTACTOE").await.expect("queue open");
        drop(conn);

        assert_eq!(pump.outbound.recv().await, Some(Outbound::Line("TICTACTOE".into())));
        assert_eq!(pump.outbound.recv().await, None);
    }

    #[tokio::test]
    async fn test_receive_reports_closed_queue_as_disconnect() {
        let (mut conn, pump) = Conn::new(1, "test", 4);
        drop(pump);
        assert_eq!(conn.receive().await, Inbound::Disconnected);
        assert_eq!(conn.send("MOVE X").await, Err(ConnError::Closed));
    }
}
