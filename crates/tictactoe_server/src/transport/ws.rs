//! Websocket binding: one protocol line per text frame.
//!
//! The upgrade happens in its own task per accepted socket, so a client that
//! never finishes it cannot hold up the accept loop. Ping and pong frames are
//! answered by the websocket layer and never reach the game.

use super::tcp::{accept_next, bind_socket};
use super::{close_from_pump, release, Listener, TransportOptions};
use crate::connection::{CloseHandle, Conn, ConnPump, ConnectionId, Inbound, Outbound};
use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, info_span, warn, Instrument};

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsReceiver = SplitStream<WsStream>;

/// Accepts websocket clients.
pub struct WsListener {
    inner: tokio::net::TcpListener,
    options: TransportOptions,
    upgrade_timeout: Duration,
}

impl WsListener {
    /// Binds a listening socket on `addr`. Clients that do not complete the
    /// websocket upgrade within `upgrade_timeout` are dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        backlog: i32,
        options: TransportOptions,
        upgrade_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let inner = bind_socket(addr, backlog).map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self {
            inner,
            options,
            upgrade_timeout,
        })
    }
}

#[async_trait]
impl Listener for WsListener {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    async fn poll_accept(self, connections: mpsc::Sender<Conn>) -> Result<(), TransportError> {
        let mut next_id: ConnectionId = 0;
        loop {
            let (stream, peer) = accept_next(&self.inner).await?;
            if connections.is_closed() {
                debug!("Dispatcher gone, stopping accept loop");
                return Ok(());
            }
            next_id += 1;

            let connections = connections.clone();
            let options = self.options;
            let upgrade_timeout = self.upgrade_timeout;
            let span = info_span!("conn", id = next_id, %peer);
            tokio::spawn(
                async move {
                    match upgrade(stream, upgrade_timeout).await {
                        Ok(ws) => {
                            info!("🔗 Accepted websocket connection");
                            let conn = start(ws, next_id, peer, options);
                            if connections.send(conn).await.is_err() {
                                debug!("Dispatcher gone, dropping connection");
                            }
                        }
                        Err(e) => warn!("WebSocket handshake failed: {}", e),
                    }
                }
                .instrument(span),
            );
        }
    }
}

async fn upgrade(stream: TcpStream, limit: Duration) -> Result<WsStream, TransportError> {
    match timeout(limit, accept_async(stream)).await {
        Ok(upgraded) => Ok(upgraded?),
        Err(_) => Err(TransportError::WebSocket(tungstenite::Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            "upgrade deadline elapsed",
        )))),
    }
}

fn start(ws: WsStream, id: ConnectionId, peer: SocketAddr, options: TransportOptions) -> Conn {
    let (conn, pump) = Conn::new(id, peer.to_string(), options.queue_capacity);
    let ConnPump { outbound, inbound, close, .. } = pump;
    let (sink, receiver) = ws.split();

    tokio::spawn(read_pump(receiver, inbound, close.clone(), options.io_timeout).in_current_span());
    tokio::spawn(write_pump(sink, outbound, close, options.io_timeout).in_current_span());
    conn
}

fn frame_to_line(text: &str) -> String {
    text.trim_end_matches(['\n', '\r']).to_owned()
}

async fn read_pump(
    mut receiver: WsReceiver,
    inbound: mpsc::Sender<Inbound>,
    close: CloseHandle,
    io_timeout: Duration,
) {
    loop {
        let next = tokio::select! {
            _ = close.closed() => break,
            next = timeout(io_timeout, receiver.next()) => next,
        };

        let line = match next {
            Ok(Some(Ok(Message::Text(text)))) => frame_to_line(text.as_str()),
            Ok(Some(Ok(Message::Binary(data)))) => frame_to_line(&String::from_utf8_lossy(&data)),
            Ok(Some(Ok(Message::Close(frame)))) => {
                debug!(?frame, "Peer sent close frame");
                break;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                warn!("WebSocket read failed: {}", e);
                break;
            }
            Ok(None) => {
                debug!("Peer closed the stream");
                break;
            }
            Err(_) => {
                info!(timeout = ?io_timeout, "Read deadline elapsed");
                break;
            }
        };

        tokio::select! {
            _ = close.closed() => break,
            sent = inbound.send(Inbound::Line(line)) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    release(&close, &inbound);
}

async fn write_pump(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Outbound>,
    close: CloseHandle,
    io_timeout: Duration,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = close.closed() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => {
                    debug!("Outbound queue closed");
                    break;
                }
            },
        };

        let frame = Message::Text(message.as_line().to_owned().into());
        match timeout(io_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("WebSocket write failed: {}", e);
                break;
            }
            Err(_) => {
                info!(timeout = ?io_timeout, "Write deadline elapsed");
                break;
            }
        }
        if message == Outbound::Removed {
            debug!("Removal marker written");
            break;
        }
    }

    if let Ok(Err(e)) = timeout(io_timeout, sink.close()).await {
        debug!("Close handshake failed: {}", e);
    }
    close_from_pump(&close, "write");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_map_to_lines() {
        assert_eq!(frame_to_line("TURN X 0 0"), "TURN X 0 0");
        assert_eq!(frame_to_line("TICTACTOE\n"), "TICTACTOE");
        assert_eq!(frame_to_line("TICTACTOE\r\n"), "TICTACTOE");
    }
}
