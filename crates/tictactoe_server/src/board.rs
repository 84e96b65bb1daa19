//! The 3×3 grid a lobby plays on.
//!
//! Placement is validated against the grid bounds, and a win is detected by
//! counting matching marks outward from the cell that was just filled.

use crate::tokens::{Token, EMPTY};
use std::fmt;
use thiserror::Error;

/// Number of rows on the board.
pub const ROWS: usize = 3;
/// Number of columns on the board.
pub const COLS: usize = 3;
/// Marks in a line needed to win.
const NUM_TO_WIN: usize = 3;

/// Rejections raised by [`Board::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board index out of range: {row}, {col}")]
    OutOfRange { row: i32, col: i32 },
}

/// Grid state for one game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    grid: [[Option<Token>; COLS]; ROWS],
    placed: usize,
    winner: Option<Token>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `token` at `(row, col)`.
    ///
    /// Returns `Ok(true)` when the board changed. A move on an occupied cell,
    /// a full board or an already decided board is a no-op and returns
    /// `Ok(false)`.
    pub fn put(&mut self, token: Token, row: i32, col: i32) -> Result<bool, BoardError> {
        let (r, c) = Self::index(row, col).ok_or(BoardError::OutOfRange { row, col })?;

        if self.is_full() || self.has_winner() || self.grid[r][c].is_some() {
            return Ok(false);
        }

        self.grid[r][c] = Some(token);
        self.placed += 1;
        if self.completes_line(token, r, c) {
            self.winner = Some(token);
        }
        Ok(true)
    }

    /// The mark at `(row, col)`, or `None` for an empty cell.
    pub fn at(&self, row: i32, col: i32) -> Result<Option<Token>, BoardError> {
        let (r, c) = Self::index(row, col).ok_or(BoardError::OutOfRange { row, col })?;
        Ok(self.grid[r][c])
    }

    pub fn has_winner(&self) -> bool {
        self.winner.is_some()
    }

    pub fn winning_token(&self) -> Option<Token> {
        self.winner
    }

    /// True once every cell holds a mark.
    pub fn is_full(&self) -> bool {
        self.placed == ROWS * COLS
    }

    fn index(row: i32, col: i32) -> Option<(usize, usize)> {
        let r = usize::try_from(row).ok().filter(|r| *r < ROWS)?;
        let c = usize::try_from(col).ok().filter(|c| *c < COLS)?;
        Some((r, c))
    }

    fn completes_line(&self, token: Token, row: usize, col: usize) -> bool {
        const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

        DIRECTIONS.iter().any(|&(dr, dc)| {
            1 + self.run_length(token, row, col, dr, dc) + self.run_length(token, row, col, -dr, -dc)
                >= NUM_TO_WIN
        })
    }

    /// Counts consecutive `token` cells starting next to `(row, col)` and
    /// stepping by `(dr, dc)`.
    fn run_length(&self, token: Token, row: usize, col: usize, dr: isize, dc: isize) -> usize {
        let mut count = 0;
        let (mut r, mut c) = (row as isize + dr, col as isize + dc);
        while (0..ROWS as isize).contains(&r) && (0..COLS as isize).contains(&c) {
            if self.grid[r as usize][c as usize] != Some(token) {
                break;
            }
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.grid.iter().enumerate() {
            let cells: Vec<&str> = row
                .iter()
                .map(|cell| cell.map_or(EMPTY, |t| t.as_str()))
                .collect();
            write!(f, "[{}]", cells.join(" "))?;
            if i + 1 < ROWS {
                writeln!(f)?;
            }
        }
        if let Some(winner) = self.winner {
            write!(f, "\nwinner: {winner}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(board: &mut Board, moves: &[(Token, i32, i32)]) {
        for &(token, row, col) in moves {
            assert_eq!(board.put(token, row, col), Ok(true), "move {token} {row} {col}");
        }
    }

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new();
        assert!(!board.has_winner());
        assert!(!board.is_full());
        assert_eq!(board.winning_token(), None);
        assert_eq!(board.at(1, 1), Ok(None));
    }

    #[test]
    fn test_out_of_range() {
        let mut board = Board::new();
        assert_eq!(board.put(Token::X, 3, 0), Err(BoardError::OutOfRange { row: 3, col: 0 }));
        assert_eq!(board.put(Token::X, 0, -1), Err(BoardError::OutOfRange { row: 0, col: -1 }));
        assert!(board.at(-1, 2).is_err());
    }

    #[test]
    fn test_occupied_cell_is_noop() {
        let mut board = Board::new();
        assert_eq!(board.put(Token::X, 0, 0), Ok(true));
        assert_eq!(board.put(Token::O, 0, 0), Ok(false));
        assert_eq!(board.at(0, 0), Ok(Some(Token::X)));
    }

    #[test]
    fn test_row_win() {
        let mut board = Board::new();
        play(&mut board, &[(Token::X, 1, 0), (Token::O, 0, 0), (Token::X, 1, 2), (Token::O, 0, 1)]);
        assert!(!board.has_winner());
        play(&mut board, &[(Token::X, 1, 1)]);
        assert_eq!(board.winning_token(), Some(Token::X));
    }

    #[test]
    fn test_column_win() {
        let mut board = Board::new();
        play(&mut board, &[(Token::O, 0, 2), (Token::O, 2, 2), (Token::O, 1, 2)]);
        assert_eq!(board.winning_token(), Some(Token::O));
    }

    #[test]
    fn test_diagonal_wins() {
        let mut board = Board::new();
        play(&mut board, &[(Token::X, 0, 0), (Token::X, 2, 2), (Token::X, 1, 1)]);
        assert_eq!(board.winning_token(), Some(Token::X));

        let mut board = Board::new();
        play(&mut board, &[(Token::O, 2, 0), (Token::O, 1, 1), (Token::O, 0, 2)]);
        assert_eq!(board.winning_token(), Some(Token::O));
    }

    #[test]
    fn test_decided_board_rejects_moves() {
        let mut board = Board::new();
        play(&mut board, &[(Token::X, 0, 0), (Token::X, 0, 1), (Token::X, 0, 2)]);
        assert_eq!(board.put(Token::O, 2, 2), Ok(false));
        assert_eq!(board.at(2, 2), Ok(None));
    }

    #[test]
    fn test_full_board_without_winner() {
        let mut board = Board::new();
        // X O X
        // X O O
        // O X X
        play(
            &mut board,
            &[
                (Token::X, 0, 0),
                (Token::O, 0, 1),
                (Token::X, 0, 2),
                (Token::O, 1, 1),
                (Token::X, 1, 0),
                (Token::O, 1, 2),
                (Token::X, 2, 1),
                (Token::O, 2, 0),
                (Token::X, 2, 2),
            ],
        );
        assert!(board.is_full());
        assert!(!board.has_winner());
    }

    #[test]
    fn test_display() {
        let mut board = Board::new();
        play(&mut board, &[(Token::X, 0, 0), (Token::O, 1, 1)]);
        assert_eq!(board.to_string(), "[X _ _]\n[_ O _]\n[_ _ _]");
    }
}
