//! Newline-framed TCP binding.

use super::{
    close_from_pump, is_transient, is_transient_accept_error, release, Listener, TransportOptions,
    ACCEPT_RETRY_DELAY, MAX_LINE_LENGTH,
};
use crate::connection::{CloseHandle, Conn, ConnPump, ConnectionId, Inbound, Outbound};
use crate::error::TransportError;
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Accepts plain TCP clients speaking one protocol line per `\n`.
pub struct TcpListener {
    inner: tokio::net::TcpListener,
    options: TransportOptions,
}

impl TcpListener {
    /// Binds a listening socket on `addr`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        backlog: i32,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        let inner = bind_socket(addr, backlog).map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self { inner, options })
    }
}

/// Builds a reusable, non-blocking listening socket and registers it with
/// the runtime.
pub(crate) fn bind_socket(addr: SocketAddr, backlog: i32) -> io::Result<tokio::net::TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if let Err(e) = socket.set_reuse_address(true) {
        warn!("Failed to set SO_REUSEADDR: {}", e);
    }
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    let std_listener: StdTcpListener = socket.into();
    std_listener.set_nonblocking(true)?;
    tokio::net::TcpListener::from_std(std_listener)
}

/// Accepts the next client, skipping over transient errors.
pub(crate) async fn accept_next(
    listener: &tokio::net::TcpListener,
) -> Result<(TcpStream, SocketAddr), TransportError> {
    loop {
        match listener.accept().await {
            Ok(accepted) => return Ok(accepted),
            Err(e) if is_transient_accept_error(&e) => {
                warn!("Transient accept error: {}", e);
                sleep(ACCEPT_RETRY_DELAY).await;
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                return Err(TransportError::Accept(e));
            }
        }
    }
}

#[async_trait]
impl Listener for TcpListener {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    async fn poll_accept(self, connections: mpsc::Sender<Conn>) -> Result<(), TransportError> {
        let mut next_id: ConnectionId = 0;
        loop {
            let (stream, peer) = accept_next(&self.inner).await?;
            next_id += 1;
            if let Err(e) = stream.set_nodelay(true) {
                debug!(conn = next_id, "Failed to set TCP_NODELAY: {}", e);
            }

            let conn = start(stream, next_id, peer, self.options);
            info!(conn = next_id, %peer, "🔗 Accepted connection");
            if connections.send(conn).await.is_err() {
                debug!("Dispatcher gone, stopping accept loop");
                return Ok(());
            }
        }
    }
}

/// Spawns both pumps for an accepted stream and returns the game-facing end.
fn start(stream: TcpStream, id: ConnectionId, peer: SocketAddr, options: TransportOptions) -> Conn {
    let (conn, pump) = Conn::new(id, peer.to_string(), options.queue_capacity);
    let ConnPump { outbound, inbound, close, .. } = pump;
    let span = info_span!("conn", id, %peer);
    let (reader, writer) = stream.into_split();

    tokio::spawn(
        read_pump(BufReader::new(reader), inbound, close.clone(), options.io_timeout)
            .instrument(span.clone()),
    );
    tokio::spawn(write_pump(writer, outbound, close, options.io_timeout).instrument(span));
    conn
}

/// Reads lines from the client into the inbound queue until EOF, a
/// permanent error, an elapsed read deadline or a close request.
///
/// A line longer than [`MAX_LINE_LENGTH`] is a permanent error.
pub(crate) async fn read_pump<R>(
    mut reader: R,
    inbound: mpsc::Sender<Inbound>,
    close: CloseHandle,
    io_timeout: Duration,
) where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(64);
    loop {
        let next = tokio::select! {
            _ = close.closed() => break,
            next = timeout(io_timeout, read_line(&mut reader, &mut buf)) => next,
        };

        let line = match next {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                debug!("Peer closed the stream");
                break;
            }
            Ok(Err(e)) if is_transient(&e) => {
                debug!("Transient read error: {}", e);
                continue;
            }
            Ok(Err(e)) => {
                warn!("Read failed: {}", e);
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

/// Reads one line, stripping `\n` or `\r\n`. Returns `None` at EOF.
///
/// Invalid UTF-8 is replaced rather than rejected so a garbled move still
/// reaches the game as a line it can answer.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_LENGTH as u64 + 1;
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > MAX_LINE_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_LENGTH} bytes"),
        ));
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Writes queued messages to the client until the queue closes, the removal
/// marker has been written, a permanent error occurs or the connection is
/// closed.
pub(crate) async fn write_pump<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Outbound>,
    close: CloseHandle,
    io_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
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

        if let Err(e) = write_line(&mut writer, message.as_line(), io_timeout).await {
            warn!("Write failed: {}", e);
            break;
        }
        if message == Outbound::Removed {
            debug!("Removal marker written");
            break;
        }
    }

    if let Ok(Err(e)) = timeout(io_timeout, writer.shutdown()).await {
        debug!("Shutdown failed: {}", e);
    }
    close_from_pump(&close, "write");
}

async fn write_line<W>(writer: &mut W, line: &str, io_timeout: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = format!("{line}\n");
    loop {
        let written = timeout(io_timeout, async {
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write deadline elapsed"))?;

        match written {
            Err(e) if is_transient(&e) => debug!("Transient write error: {}", e),
            result => return result,
        }
    }
}
