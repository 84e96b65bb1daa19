//! Line-oriented text protocol spoken between clients and the server.
//!
//! Every message is a single line of space-separated ASCII fields. Lines are
//! handled here without their terminator; transports add and strip the
//! newline when framing them.
//!
//! | Command  | Direction                          | Format                    |
//! |----------|------------------------------------|---------------------------|
//! | greeting | both                               | `TICTACTOE`               |
//! | PLAYER   | server → client                    | `PLAYER <token>`          |
//! | MOVE     | server → client                    | `MOVE <token>`            |
//! | TURN     | client → server, server → opponent | `TURN <token> <row> <col>`|
//! | WINNER   | server → client                    | `WINNER <token or _>`     |

use crate::tokens::{Token, EMPTY};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Handshake line both sides must send before anything else.
pub const GREETING: &str = "TICTACTOE";

/// Last line a connection receives before the server drops it.
pub const REMOVED: &str = "REMOVED";

/// A single move: `token` placed at `(row, col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    pub token: Token,
    pub row: i32,
    pub col: i32,
}

/// Commands exchanged during a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Seat assignment.
    Player(Token),
    /// It is this token's turn.
    Move(Token),
    /// A move, sent by the mover and relayed to the opponent.
    Turn(Turn),
    /// Game over. `None` means the game ended without a winner.
    Winner(Option<Token>),
}

impl Command {
    /// The operation keyword that starts the line.
    pub fn op(&self) -> &'static str {
        match self {
            Command::Player(_) => "PLAYER",
            Command::Move(_) => "MOVE",
            Command::Turn(_) => "TURN",
            Command::Winner(_) => "WINNER",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Player(token) | Command::Move(token) => write!(f, "{} {}", self.op(), token),
            Command::Turn(turn) => write!(f, "{} {} {} {}", self.op(), turn.token, turn.row, turn.col),
            Command::Winner(winner) => {
                write!(f, "{} {}", self.op(), winner.map_or(EMPTY, |t| t.as_str()))
            }
        }
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = trim_terminator(line);
        let err = || ParseError::new(line);

        let (op, rest) = line.split_once(' ').ok_or_else(err)?;
        match op {
            "PLAYER" => rest.parse().map(Command::Player).map_err(|_| err()),
            "MOVE" => rest.parse().map(Command::Move).map_err(|_| err()),
            "TURN" => parse_turn(line).map(Command::Turn),
            "WINNER" if rest == EMPTY => Ok(Command::Winner(None)),
            "WINNER" => rest.parse().map(|t| Command::Winner(Some(t))).map_err(|_| err()),
            _ => Err(err()),
        }
    }
}

/// Parses a `TURN <token> <row> <col>` line sent by a client.
///
/// The token must be one of the two player marks and both coordinates must
/// be integers; whether they fall on the board is for the board to decide.
pub fn parse_turn(line: &str) -> Result<Turn, ParseError> {
    let line = trim_terminator(line);
    let fields: Vec<&str> = line.splitn(4, ' ').collect();

    if let ["TURN", token, row, col] = fields.as_slice() {
        if let (Ok(token), Ok(row), Ok(col)) =
            (token.parse::<Token>(), row.parse::<i32>(), col.parse::<i32>())
        {
            return Ok(Turn { token, row, col });
        }
    }
    Err(ParseError::new(line))
}

fn trim_terminator(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// A line that does not have the expected format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse {line:?} into a command")]
pub struct ParseError {
    line: String,
}

impl ParseError {
    fn new(line: &str) -> Self {
        Self { line: line.to_owned() }
    }

    /// The response a client gets for sending this line.
    pub fn as_response(&self) -> ErrorResponse {
        ErrorResponse::InvalidFormat
    }
}

/// Reasons a move is rejected, as sent back to the mover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponse {
    /// The move used a token other than the mover's.
    InvalidToken,
    /// The coordinates are off the board.
    InvalidRange,
    /// The cell is taken or the board is already decided.
    InvalidFull,
    /// The line could not be parsed.
    InvalidFormat,
    /// Something went wrong that the client cannot fix.
    Internal,
}

impl ErrorResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorResponse::InvalidToken => "INVALID TOKEN",
            ErrorResponse::InvalidRange => "INVALID RANGE",
            ErrorResponse::InvalidFull => "INVALID FULL",
            ErrorResponse::InvalidFormat => "INVALID FORMAT",
            ErrorResponse::Internal => "INTERNAL ERROR",
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorResponse {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match trim_terminator(line) {
            "INVALID TOKEN" => Ok(ErrorResponse::InvalidToken),
            "INVALID RANGE" => Ok(ErrorResponse::InvalidRange),
            "INVALID FULL" => Ok(ErrorResponse::InvalidFull),
            "INVALID FORMAT" => Ok(ErrorResponse::InvalidFormat),
            "INTERNAL ERROR" => Ok(ErrorResponse::Internal),
            other => Err(ParseError::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_commands() {
        assert_eq!(Command::Player(Token::X).to_string(), "PLAYER X");
        assert_eq!(Command::Move(Token::O).to_string(), "MOVE O");
        assert_eq!(
            Command::Turn(Turn { token: Token::X, row: 0, col: 2 }).to_string(),
            "TURN X 0 2"
        );
        assert_eq!(Command::Winner(Some(Token::O)).to_string(), "WINNER O");
        assert_eq!(Command::Winner(None).to_string(), "WINNER _");
    }

    #[test]
    fn test_turn_round_trip() {
        let turn = Turn { token: Token::X, row: 1, col: 2 };
        let line = Command::Turn(turn).to_string();
        assert_eq!(parse_turn(&line), Ok(turn));
    }

    #[test]
    fn test_parse_turn_accepts_terminators() {
        let expected = Turn { token: Token::O, row: 2, col: 0 };
        assert_eq!(parse_turn("TURN O 2 0\n"), Ok(expected));
        assert_eq!(parse_turn("TURN O 2 0\r\n"), Ok(expected));
    }

    #[test]
    fn test_parse_turn_keeps_out_of_range_coordinates() {
        // The board owns range checks.
        assert_eq!(
            parse_turn("TURN X -1 7"),
            Ok(Turn { token: Token::X, row: -1, col: 7 })
        );
    }

    #[test]
    fn test_parse_turn_rejects_malformed_lines() {
        for line in [
            "",
            "TURN",
            "TURN X 1",
            "TURN X 1 2 3",
            "TURN Z 1 2",
            "TURN _ 1 2",
            "TURN X a 2",
            "turn X 1 2",
            "MOVE X",
            "TICTACTOE",
        ] {
            let err = parse_turn(line).expect_err(line);
            assert_eq!(err.as_response(), ErrorResponse::InvalidFormat);
        }
    }

    #[test]
    fn test_parse_server_commands() {
        assert_eq!("PLAYER O".parse::<Command>(), Ok(Command::Player(Token::O)));
        assert_eq!("MOVE X\n".parse::<Command>(), Ok(Command::Move(Token::X)));
        assert_eq!("WINNER _".parse::<Command>(), Ok(Command::Winner(None)));
        assert_eq!("WINNER X".parse::<Command>(), Ok(Command::Winner(Some(Token::X))));
        assert_eq!(
            "TURN X 0 0".parse::<Command>(),
            Ok(Command::Turn(Turn { token: Token::X, row: 0, col: 0 }))
        );
        assert!("PLAYER".parse::<Command>().is_err());
        assert!("WINNER Y".parse::<Command>().is_err());
        assert!(REMOVED.parse::<Command>().is_err());
    }

    #[test]
    fn test_error_responses() {
        for response in [
            ErrorResponse::InvalidToken,
            ErrorResponse::InvalidRange,
            ErrorResponse::InvalidFull,
            ErrorResponse::InvalidFormat,
            ErrorResponse::Internal,
        ] {
            assert_eq!(response.to_string().parse::<ErrorResponse>(), Ok(response));
        }
        assert_eq!(ErrorResponse::InvalidFull.to_string(), "INVALID FULL");
    }
}
