//! Transport bindings that turn raw client sockets into [`Conn`] handles.
//!
//! A transport runs an accept loop and, for every accepted client, two pump
//! tasks:
//!
//! * a **read pump** that reads one line at a time under a read deadline and
//!   pushes it onto the connection's inbound queue, and
//! * a **write pump** that pops outbound messages and writes them under a
//!   write deadline.
//!
//! Either pump may close the connection. The close signal is shared, so the
//! other pump stops as soon as it observes it, and the read pump always
//! leaves [`Inbound::Disconnected`] behind for whoever is reading.
//!
//! Two bindings exist: plain newline-framed TCP ([`tcp`]) and websocket text
//! frames ([`ws`]). Both implement [`Listener`], which is all the dispatcher
//! needs.

use crate::connection::{CloseHandle, Conn, Inbound};
use crate::error::{ConnError, TransportError};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub mod tcp;
pub mod ws;

pub use tcp::TcpListener;
pub use ws::WsListener;

/// Pause after a transient accept error before accepting again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Longest line a client may send, terminator excluded. The longest valid
/// move is well under this.
pub const MAX_LINE_LENGTH: usize = 1024;

/// A source of client connections.
#[async_trait]
pub trait Listener: Send + Sized + 'static {
    /// The address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Accepts clients until a permanent error occurs or `connections` is
    /// dropped, handing each one over as a [`Conn`].
    ///
    /// Transient accept errors are logged and skipped. A permanent error ends
    /// the loop and is returned.
    async fn poll_accept(self, connections: mpsc::Sender<Conn>) -> Result<(), TransportError>;
}

/// Per-connection settings shared by every transport.
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    /// Deadline for a single socket read or write.
    pub io_timeout: Duration,
    /// Capacity of each connection queue.
    pub queue_capacity: usize,
}

/// Errors worth retrying on the same socket.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// Accept errors that concern a single client, not the listener itself.
pub(crate) fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    )
}

/// Closes the connection from inside a pump. Losing the race to the other
/// pump (or to the game) is expected and only logged.
pub(crate) fn close_from_pump(close: &CloseHandle, pump: &'static str) {
    match close.close() {
        Ok(()) => debug!(pump, "closed connection"),
        Err(ConnError::AlreadyClosed) => debug!(pump, "connection already closed"),
        Err(e) => debug!(pump, error = %e, "close failed"),
    }
}

/// Final step of every read pump: close the connection, then tell the
/// reader of the inbound queue that the client is gone.
///
/// The disconnect signal is best effort. If the queue is full the reader
/// still sees the queue close once the pump drops its sender.
pub(crate) fn release(close: &CloseHandle, inbound: &mpsc::Sender<Inbound>) {
    close_from_pump(close, "read");
    if inbound.try_send(Inbound::Disconnected).is_err() {
        debug!("inbound queue full or gone, disconnect will show as queue closure");
    }
}
