//! Reusable two-player game sessions.
//!
//! A [`Lobby`] collects players until both seats are taken, then hands them
//! to a game task and refuses everyone else until that game is over. Once the
//! game ends every seat is vacated and the lobby takes players again.
//!
//! Lobby status is kept in atomics so the dispatcher can scan the pool
//! without waiting on a running game.

mod game;
mod player;

pub use game::MAX_TURN_ATTEMPTS;
pub use player::Player;

use crate::connection::Conn;
use crate::error::LobbyError;
use crate::tokens::Token;
use game::Game;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, info_span, Instrument, Span};

/// Index of a lobby within the server's pool.
pub type LobbyId = usize;

/// Players per lobby.
pub const SEATS: usize = 2;

pub struct Lobby {
    id: LobbyId,
    seats: Mutex<[Option<Player>; SEATS]>,
    occupied: AtomicUsize,
    playing: AtomicBool,
    span: Span,
}

impl Lobby {
    pub fn new(id: LobbyId) -> Self {
        Self {
            id,
            seats: Mutex::new(Default::default()),
            occupied: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            span: info_span!("lobby", id),
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    /// True while the lobby has a free seat and no game running.
    pub fn is_available(&self) -> bool {
        !self.is_full() && !self.is_playing()
    }

    pub fn is_full(&self) -> bool {
        self.occupied() >= SEATS
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Number of seats taken.
    pub fn occupied(&self) -> usize {
        self.occupied.load(Ordering::Acquire)
    }

    /// Seats `conn` in the first free seat and returns the seat index.
    ///
    /// Filling the last seat starts the game on its own task; this call does
    /// not wait for it. On error the connection is dropped.
    pub async fn add_player(self: &Arc<Self>, conn: Conn) -> Result<usize, LobbyError> {
        if self.is_playing() {
            return Err(LobbyError::Unavailable(self.id));
        }

        let mut seats = self.seats.lock().await;
        // A game may have started while we waited for the lock.
        if self.is_playing() {
            return Err(LobbyError::Unavailable(self.id));
        }
        let seat = seats
            .iter()
            .position(Option::is_none)
            .ok_or(LobbyError::Full(self.id))?;
        let token = Token::from_seat(seat).ok_or(LobbyError::Full(self.id))?;

        info!(parent: &self.span, seat, %token, conn = conn.id(), peer = conn.peer(), "👋 Player joined");
        seats[seat] = Some(Player::new(seat, token, conn));
        let occupied = self.occupied.fetch_add(1, Ordering::AcqRel) + 1;

        if occupied == SEATS {
            self.playing.store(true, Ordering::Release);
            let game = Game::new(std::mem::take(&mut *seats));
            tokio::spawn(game.run(Arc::clone(self)).instrument(self.span.clone()));
        }
        Ok(seat)
    }

    /// Marks the lobby joinable again. Called by the game task once every
    /// seat has been vacated.
    fn finish(&self) {
        self.occupied.store(0, Ordering::Release);
        self.playing.store(false, Ordering::Release);
        info!(parent: &self.span, "Lobby open");
    }
}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("id", &self.id)
            .field("occupied", &self.occupied())
            .field("playing", &self.is_playing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnPump, Inbound, Outbound};
    use crate::protocol::REMOVED;
    use std::time::Duration;
    use tokio::time::timeout;

    const LIMIT: Duration = Duration::from_secs(5);

    /// The client end of an in-memory connection.
    struct Client {
        pump: ConnPump,
    }

    impl Client {
        fn connect(id: usize) -> (Conn, Client) {
            let (conn, pump) = Conn::new(id, format!("client-{id}"), 10);
            (conn, Client { pump })
        }

        async fn expect(&mut self, line: &str) {
            let received = timeout(LIMIT, self.pump.outbound.recv())
                .await
                .expect("timed out waiting for server");
            assert_eq!(received.as_ref().map(Outbound::as_line), Some(line));
        }

        async fn expect_closed(&mut self) {
            let received = timeout(LIMIT, self.pump.outbound.recv())
                .await
                .expect("timed out waiting for queue close");
            assert_eq!(received, None);
        }

        async fn say(&self, line: &str) {
            self.pump
                .inbound
                .send(Inbound::Line(line.to_string()))
                .await
                .expect("server stopped reading");
        }

        async fn disconnect(&self) {
            self.pump
                .inbound
                .send(Inbound::Disconnected)
                .await
                .expect("server stopped reading");
        }
    }

    async fn wait_until_open(lobby: &Lobby) {
        timeout(LIMIT, async {
            while !lobby.is_available() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("lobby never reopened");
    }

    async fn start_game(lobby: &Arc<Lobby>) -> (Client, Client) {
        let (conn_x, mut x) = Client::connect(1);
        let (conn_o, mut o) = Client::connect(2);
        assert_eq!(lobby.add_player(conn_x).await, Ok(0));
        assert!(lobby.is_available());
        assert_eq!(lobby.add_player(conn_o).await, Ok(1));
        assert!(!lobby.is_available());

        x.expect("PLAYER X").await;
        o.expect("PLAYER O").await;
        (x, o)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_game_to_win() {
        let lobby = Arc::new(Lobby::new(0));
        let (mut x, mut o) = start_game(&lobby).await;

        for (mover, row, col) in [("X", 0, 0), ("O", 1, 0), ("X", 0, 1), ("O", 1, 1)] {
            let (me, other) = if mover == "X" { (&mut x, &mut o) } else { (&mut o, &mut x) };
            me.expect(&format!("MOVE {mover}")).await;
            me.say(&format!("TURN {mover} {row} {col}")).await;
            other.expect(&format!("TURN {mover} {row} {col}")).await;
        }

        x.expect("MOVE X").await;
        x.say("TURN X 0 2").await;
        o.expect("TURN X 0 2").await;

        for client in [&mut x, &mut o] {
            client.expect("WINNER X").await;
            client.expect(REMOVED).await;
            client.expect_closed().await;
        }
        wait_until_open(&lobby).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_moves_are_rejected_then_forfeit() {
        let lobby = Arc::new(Lobby::new(0));
        let (mut x, mut o) = start_game(&lobby).await;

        x.expect("MOVE X").await;
        x.say("TURN X 5 5").await;
        x.expect("INVALID RANGE").await;
        x.say("TURN O 0 0").await;
        x.expect("INVALID TOKEN").await;
        x.say("hello").await;
        x.expect("INVALID FORMAT").await;

        x.expect(REMOVED).await;
        x.expect_closed().await;
        o.expect("WINNER _").await;
        o.expect(REMOVED).await;
        o.expect_closed().await;
        wait_until_open(&lobby).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_garbled_move_costs_an_attempt() {
        let lobby = Arc::new(Lobby::new(0));
        let (mut x, mut o) = start_game(&lobby).await;

        // What the TCP binding hands over for `TURN X 0 \xfe`.
        x.expect("MOVE X").await;
        x.say("TURN X 0 \u{FFFD}").await;
        x.expect("INVALID FORMAT").await;
        x.say("TURN X 0 0").await;
        o.expect("TURN X 0 0").await;
        o.expect("MOVE O").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_occupied_cell_costs_an_attempt() {
        let lobby = Arc::new(Lobby::new(0));
        let (mut x, mut o) = start_game(&lobby).await;

        x.expect("MOVE X").await;
        x.say("TURN X 1 1").await;
        o.expect("TURN X 1 1").await;
        o.expect("MOVE O").await;
        o.say("TURN O 1 1").await;
        o.expect("INVALID FULL").await;
        o.say("TURN O 2 2").await;
        x.expect("TURN O 2 2").await;
        x.expect("MOVE X").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disconnect_ends_game_for_opponent() {
        let lobby = Arc::new(Lobby::new(3));
        let (mut x, mut o) = start_game(&lobby).await;

        x.expect("MOVE X").await;
        x.say("TURN X 0 0").await;
        o.expect("TURN X 0 0").await;
        o.expect("MOVE O").await;
        o.disconnect().await;

        x.expect("WINNER _").await;
        x.expect(REMOVED).await;
        x.expect_closed().await;
        wait_until_open(&lobby).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_draw_announces_no_winner() {
        let lobby = Arc::new(Lobby::new(0));
        let (mut x, mut o) = start_game(&lobby).await;

        // X O X
        // X O O
        // O X X
        let moves = [
            ("X", 0, 0),
            ("O", 0, 1),
            ("X", 0, 2),
            ("O", 1, 1),
            ("X", 1, 0),
            ("O", 1, 2),
            ("X", 2, 1),
            ("O", 2, 0),
            ("X", 2, 2),
        ];
        for (mover, row, col) in moves {
            let (me, other) = if mover == "X" { (&mut x, &mut o) } else { (&mut o, &mut x) };
            me.expect(&format!("MOVE {mover}")).await;
            me.say(&format!("TURN {mover} {row} {col}")).await;
            other.expect(&format!("TURN {mover} {row} {col}")).await;
        }

        for client in [&mut x, &mut o] {
            client.expect("WINNER _").await;
            client.expect(REMOVED).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lobby_is_reusable_with_fresh_board() {
        let lobby = Arc::new(Lobby::new(0));
        let (mut x, mut o) = start_game(&lobby).await;

        x.expect("MOVE X").await;
        x.say("TURN X 1 1").await;
        o.expect("TURN X 1 1").await;
        o.expect("MOVE O").await;
        o.disconnect().await;
        x.expect("WINNER _").await;
        wait_until_open(&lobby).await;

        // The cell taken in the last game is free again, and X moves first.
        let (mut x, mut o) = start_game(&lobby).await;
        x.expect("MOVE X").await;
        x.say("TURN X 1 1").await;
        o.expect("TURN X 1 1").await;
        o.expect("MOVE O").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_playing_lobby_refuses_players() {
        let lobby = Arc::new(Lobby::new(4));
        let (_x, _o) = start_game(&lobby).await;
        assert!(lobby.is_full());
        assert!(lobby.is_playing());

        let (conn, mut late) = Client::connect(3);
        assert_eq!(lobby.add_player(conn).await, Err(LobbyError::Unavailable(4)));
        late.expect_closed().await;
    }
}
