//! Server module containing the dispatcher.
//!
//! The dispatcher takes connections from a [`Listener`](crate::transport::Listener),
//! runs the greeting exchange on each and seats it in the first available
//! lobby of a fixed pool.

pub mod core;
pub mod handlers;

pub use core::GameServer;
pub use handlers::{handshake, LobbyPool};
