//! Core game server implementation.
//!
//! This module contains the main `GameServer` struct: it owns the lobby pool,
//! drives a listener's accept loop and dispatches every accepted connection
//! to its own handler task.

use crate::{
    config::{ServerConfig, TransportKind},
    connection::Conn,
    error::ServerError,
    server::handlers::{handle_connection, LobbyPool},
    transport::{Listener, TcpListener, WsListener},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

/// The core game server structure.
///
/// `GameServer` owns a fixed pool of lobbies for its whole lifetime. It does
/// not know how clients reach it: any [`Listener`] can feed it connections,
/// and every connection goes through the same greeting and lobby assignment.
///
/// # Architecture
///
/// * **Accept task**: the listener's accept loop, spawned by [`serve`](Self::serve)
/// * **Dispatcher loop**: receives accepted connections and spawns a handler for each
/// * **Handlers**: greeting exchange, pool scan, seating
/// * **Lobbies**: each running game is its own task, started by the lobby itself
pub struct GameServer {
    /// Server configuration settings
    config: ServerConfig,

    /// The lobbies connections are seated in
    pool: Arc<LobbyPool>,

    /// Channel for coordinating server shutdown. Latched, so a `serve` that
    /// starts after `shutdown` returns at once.
    shutdown_sender: watch::Sender<bool>,
}

impl GameServer {
    /// Creates a new game server with the specified configuration.
    ///
    /// The lobby pool is built here with ids `0..config.lobbies`.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let pool = Arc::new(LobbyPool::new(config.lobbies));
        let (shutdown_sender, _) = watch::channel(false);

        Ok(Self {
            config,
            pool,
            shutdown_sender,
        })
    }

    /// Binds the configured transport and serves until shutdown or a
    /// permanent listener failure.
    pub async fn start(&self) -> Result<(), ServerError> {
        let addr = self.config.bind_address;
        let backlog = self.config.listen_backlog();
        let options = self.config.transport_options();

        info!("🚀 Starting game server on {} ({})", addr, self.config.transport);
        match self.config.transport {
            TransportKind::Tcp => self.serve(TcpListener::bind(addr, backlog, options)?).await,
            TransportKind::WebSocket => {
                let listener =
                    WsListener::bind(addr, backlog, options, self.config.handshake_timeout)?;
                self.serve(listener).await
            }
        }
    }

    /// Serves connections from `listener`.
    ///
    /// Returns `Ok(())` after [`shutdown`](Self::shutdown), or the listener's
    /// error if its accept loop stopped on its own. On shutdown, handlers
    /// still greeting or seating a client are aborted and their connections
    /// closed; otherwise they are awaited. Games already under way keep
    /// running on their own tasks.
    pub async fn serve<L: Listener>(&self, listener: L) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Listener has no local address: {e}")))?;
        info!("✅ Listening on {} with {} lobbies", local_addr, self.pool.lobbies().len());

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let (connection_sender, mut connections) =
            mpsc::channel::<Conn>(self.config.accept_backlog);
        let accept_task = tokio::spawn(
            listener
                .poll_accept(connection_sender)
                .instrument(info_span!("accept", addr = %local_addr)),
        );

        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                conn = connections.recv() => match conn {
                    Some(conn) => {
                        let span = info_span!("handler", conn = conn.id(), peer = conn.peer());
                        handlers.spawn(
                            handle_connection(conn, self.pool.clone(), self.config.handshake_timeout)
                                .instrument(span),
                        );
                    }
                    None => break,
                },
                _ = shutdown_receiver.wait_for(|stopping| *stopping) => {
                    info!("Shutdown signal received");
                    accept_task.abort();
                    handlers.abort_all();
                    break;
                }
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection handler failed: {}", e);
                    }
                }
            }
        }

        drop(connections);
        while let Some(joined) = handlers.join_next().await {
            match joined {
                Err(e) if e.is_cancelled() => debug!("Connection handler aborted"),
                Err(e) => error!("Connection handler failed: {}", e),
                Ok(()) => {}
            }
        }

        match accept_task.await {
            Ok(Ok(())) => {
                info!("Server stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Listener failed: {}", e);
                Err(ServerError::Transport(e))
            }
            Err(e) if e.is_cancelled() => {
                info!("Server stopped");
                Ok(())
            }
            Err(e) => Err(ServerError::Internal(format!("Accept loop failed: {e}"))),
        }
    }

    /// Initiates server shutdown.
    ///
    /// Stops the accept loop and the dispatcher of every running
    /// [`serve`](Self::serve) call.
    pub fn shutdown(&self) {
        info!("🛑 Shutting down server...");
        self.shutdown_sender.send_replace(true);
    }

    /// Number of lobbies that would take a player right now.
    pub fn available_lobbies(&self) -> usize {
        self.pool.available()
    }

    pub fn pool(&self) -> &LobbyPool {
        &self.pool
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
