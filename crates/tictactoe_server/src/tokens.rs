//! Player marks.
//!
//! A player's token is decided by the seat they take in a lobby and stays
//! fixed for as long as their connection lives in that lobby.

use std::fmt;
use std::str::FromStr;

/// Wire spelling of an empty cell, also used to announce "no winner".
pub const EMPTY: &str = "_";

/// The mark a player places on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// Seat 0, always moves first.
    X,
    /// Seat 1.
    O,
}

impl Token {
    /// Returns the token assigned to a seat index, or `None` for seats a
    /// lobby does not have.
    pub fn from_seat(seat: usize) -> Option<Self> {
        match seat {
            0 => Some(Token::X),
            1 => Some(Token::O),
            _ => None,
        }
    }

    /// Wire spelling of the token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Token::X => "X",
            Token::O => "O",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Token {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" => Ok(Token::X),
            "O" => Ok(Token::O),
            _ => Err(()),
        }
    }
}
