//! # Tic-Tac-Toe Server
//!
//! A multiplayer game server that pairs clients into two-player lobbies and
//! referees tic-tac-toe matches over a line-oriented text protocol.
//!
//! ## Design Philosophy
//!
//! Game logic never touches a socket. Every client is represented by a
//! [`Conn`](connection::Conn): a pair of bounded queues plus a close signal.
//! Transports fill and drain those queues; lobbies only read and write them.
//!
//! * **Transports** accept clients and run two pump tasks per connection
//! * **The dispatcher** greets each client and seats it in a free lobby
//! * **Lobbies** run one match at a time and are reused forever
//!
//! ## Architecture Overview
//!
//! ### Message Flow
//!
//! 1. A [`Listener`](transport::Listener) accepts a socket and starts its read and write pumps
//! 2. [`GameServer`] exchanges the `TICTACTOE` greeting with the client
//! 3. The first available [`Lobby`](lobby::Lobby) in the pool takes the client
//! 4. When the second seat fills, the lobby starts the game on its own task
//! 5. The game sends `PLAYER`, `MOVE`, `TURN` and `WINNER` lines through the queues
//! 6. On any ending every player gets `REMOVED` and the lobby opens again
//!
//! ### Example
//!
//! ```no_run
//! use tictactoe_server::{GameServer, ServerConfig};
//!
//! # async fn run() -> Result<(), tictactoe_server::ServerError> {
//! let server = GameServer::new(ServerConfig::default())?;
//! server.start().await
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Transport failures surface to games only as a closed queue or an
//! [`Inbound::Disconnected`](connection::Inbound::Disconnected) message. Rule
//! violations become protocol error lines sent to the offending client. The
//! structured error types in [`error`] are for the code that owns a server.
//!
//! ## Thread Safety
//!
//! * Lobby status lives in atomics, so pool scans never wait on a game
//! * A single lock serializes the pool scan, not the seating or the game
//! * Each connection is closed exactly once; later attempts report
//!   [`ConnError::AlreadyClosed`](error::ConnError::AlreadyClosed)

// Re-export core types for easy access
pub use config::{ServerConfig, TransportKind};
pub use error::ServerError;
pub use server::GameServer;

// Public module declarations
pub mod board;
pub mod config;
pub mod connection;
pub mod error;
pub mod lobby;
pub mod protocol;
pub mod server;
pub mod tokens;
pub mod transport;
