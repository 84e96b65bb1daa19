//! The turn loop of a single match.

use super::{Lobby, Player, SEATS};
use crate::board::{Board, BoardError};
use crate::connection::Inbound;
use crate::protocol::{parse_turn, Command, ErrorResponse, Turn};
use crate::tokens::Token;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts a mover gets to send a valid move before forfeiting.
pub const MAX_TURN_ATTEMPTS: usize = 3;

enum TurnResult {
    Moved(Turn),
    Disconnected,
    Exhausted,
}

/// State of one match. Built when a lobby fills and consumed when the match
/// ends, so every match starts from an empty board with seat 0 to move.
pub(crate) struct Game {
    players: [Option<Player>; SEATS],
    board: Board,
    current: Option<usize>,
}

impl Game {
    pub(crate) fn new(players: [Option<Player>; SEATS]) -> Self {
        Self {
            players,
            board: Board::new(),
            current: None,
        }
    }

    /// Plays the match to its end, vacates every seat and reopens the lobby.
    pub(crate) async fn run(mut self, lobby: Arc<Lobby>) {
        info!("🎮 Game started");
        self.identify_players().await;
        let winner = self.play().await;
        self.terminate(winner).await;
        lobby.finish();
    }

    async fn identify_players(&self) {
        for player in self.players.iter().flatten() {
            player.send(Command::Player(player.token())).await;
        }
    }

    /// Runs turns until the board is decided or full, or a mover is removed.
    /// Returns the winning token, if any.
    async fn play(&mut self) -> Option<Token> {
        while !self.board.has_winner() && !self.board.is_full() {
            let seat = self.next_seat();
            let Some(mover) = self.players[seat].as_ref() else {
                warn!(seat, "Seat emptied during play");
                return None;
            };
            mover.send(Command::Move(mover.token())).await;

            match self.take_turn(seat).await {
                TurnResult::Moved(turn) => {
                    debug!(seat, token = %turn.token, row = turn.row, col = turn.col, "Move accepted");
                    self.relay(seat, turn).await;
                }
                TurnResult::Disconnected => {
                    self.remove(seat, "disconnected").await;
                    return None;
                }
                TurnResult::Exhausted => {
                    self.remove(seat, "too many invalid moves").await;
                    return None;
                }
            }
        }
        self.board.winning_token()
    }

    fn next_seat(&mut self) -> usize {
        let seat = self.current.map_or(0, |seat| (seat + 1) % SEATS);
        self.current = Some(seat);
        seat
    }

    async fn take_turn(&mut self, seat: usize) -> TurnResult {
        let Some(player) = self.players[seat].as_mut() else {
            return TurnResult::Disconnected;
        };

        for attempt in 1..=MAX_TURN_ATTEMPTS {
            let line = match player.receive().await {
                Inbound::Line(line) => line,
                Inbound::Disconnected => return TurnResult::Disconnected,
            };

            let rejection = match parse_turn(&line) {
                Err(e) => e.as_response(),
                Ok(turn) if turn.token != player.token() => ErrorResponse::InvalidToken,
                Ok(turn) => match self.board.put(turn.token, turn.row, turn.col) {
                    Ok(true) => return TurnResult::Moved(turn),
                    Ok(false) => ErrorResponse::InvalidFull,
                    Err(BoardError::OutOfRange { .. }) => ErrorResponse::InvalidRange,
                },
            };
            debug!(seat, attempt, %rejection, line = %line, "Move rejected");
            player.reject(rejection).await;
        }
        TurnResult::Exhausted
    }

    /// Tells everyone but the mover about an accepted move.
    async fn relay(&self, mover: usize, turn: Turn) {
        for player in self.players.iter().flatten() {
            if player.seat() != mover {
                player.send(Command::Turn(turn)).await;
            }
        }
    }

    async fn remove(&mut self, seat: usize, reason: &str) {
        if let Some(player) = self.players[seat].take() {
            player.remove(reason).await;
        }
    }

    async fn terminate(&mut self, winner: Option<Token>) {
        match winner {
            Some(token) => info!(%token, "🏆 Game won"),
            None if self.board.is_full() => info!("Game drawn"),
            None => info!("Game ended without a winner"),
        }
        debug!("Final board:\n{}", self.board);

        for player in self.players.iter().flatten() {
            player.send(Command::Winner(winner)).await;
        }
        for seat in 0..SEATS {
            self.remove(seat, "game over").await;
        }
    }
}
