use serde::{Deserialize, Serialize};

pub const BOARD_SIZE: usize = 9;

/// The castle (throne) square at the centre of the board.
pub const CASTLE: (usize, usize) = (4, 4);

/// The four camp-centre cells. A black soldier standing on one of these may
/// still move within its own camp group.
pub const CAMP_CENTERS: [(usize, usize); 4] = [(0, 4), (4, 0), (4, 8), (8, 4)];

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

/// What occupies a cell. The King is a White piece but captures and win
/// conditions treat it separately from white soldiers.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum Cell {
    Empty,
    White,
    Black,
    King,
}

impl Cell {
    /// The side a piece belongs to. Empty cells belong to no one.
    pub fn owner(&self) -> Option<Color> {
        match self {
            Cell::White | Cell::King => Some(Color::White),
            Cell::Black => Some(Color::Black),
            Cell::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Cell::Empty
    }
}

/// Terrain is a property of coordinates alone; the occupant grid never
/// stores it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Terrain {
    Plain,
    Escape,
    Camp,
    Castle,
}

/// The four camp groups, one per board edge: top, bottom, left, right.
const CAMP_GROUPS: [[(usize, usize); 4]; 4] = [
    [(0, 3), (0, 4), (0, 5), (1, 4)],
    [(8, 3), (8, 4), (8, 5), (7, 4)],
    [(3, 0), (4, 0), (5, 0), (4, 1)],
    [(3, 8), (4, 8), (5, 8), (4, 7)],
];

/// Index of the camp group containing (row, col), if any.
pub fn camp_group(row: usize, col: usize) -> Option<usize> {
    CAMP_GROUPS
        .iter()
        .position(|group| group.contains(&(row, col)))
}

pub fn is_camp_center(row: usize, col: usize) -> bool {
    CAMP_CENTERS.contains(&(row, col))
}

pub fn terrain_at(row: usize, col: usize) -> Terrain {
    if (row, col) == CASTLE {
        return Terrain::Castle;
    }
    if camp_group(row, col).is_some() {
        return Terrain::Camp;
    }
    let edge_offset = |i: usize| matches!(i, 1 | 2 | 6 | 7);
    if ((row == 0 || row == 8) && edge_offset(col)) || ((col == 0 || col == 8) && edge_offset(row)) {
        return Terrain::Escape;
    }
    Terrain::Plain
}
