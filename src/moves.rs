use serde::{Deserialize, Serialize};

use crate::piece::BOARD_SIZE;

/// An orthogonal slide from one cell to another. Coordinates are
/// (row, column) with (0, 0) in the top-left corner.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Move {
    pub from: (usize, usize),
    pub to: (usize, usize),
}

impl Move {
    pub fn new(from: (usize, usize), to: (usize, usize)) -> Move {
        Move { from, to }
    }

    /// Server notation for the origin square, e.g. (0, 4) -> "e1".
    pub fn from_square(&self) -> String {
        square_name(self.from)
    }

    /// Server notation for the destination square.
    pub fn to_square(&self) -> String {
        square_name(self.to)
    }

    /// Parse a move from a pair of server square names.
    pub fn from_squares(from: &str, to: &str) -> Option<Move> {
        Some(Move {
            from: parse_square(from)?,
            to: parse_square(to)?,
        })
    }
}

/// Column letter 'a'..'i' followed by the 1-based row digit.
pub fn square_name((row, col): (usize, usize)) -> String {
    let file = (b'a' + col as u8) as char;
    let rank = (b'1' + row as u8) as char;
    format!("{file}{rank}")
}

pub fn parse_square(s: &str) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let col = bytes[0].checked_sub(b'a')? as usize;
    let row = bytes[1].checked_sub(b'1')? as usize;
    if row >= BOARD_SIZE || col >= BOARD_SIZE {
        return None;
    }
    Some((row, col))
}
