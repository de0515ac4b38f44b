//! Wire protocol and board geometry shared by the server and its clients.
//!
//! Every record on the wire is one JSON object terminated by a newline. The
//! `type` field selects the variant of [`ClientMessage`] or [`ServerMessage`].

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;

pub use codec::{decode_line, encode_line, CodecError, LineBuffer, MAX_LINE_LEN};

pub const BOARD_SIZE: usize = 6;
pub const PIECES_PER_KIND: usize = 4;
pub const PIECES_PER_SEAT: usize = 2 * PIECES_PER_KIND;

/// Session-local role. Seat1 sets up on the top rows, Seat2 on the bottom rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    Seat1,
    Seat2,
}

impl Seat {
    pub const ALL: [Seat; 2] = [Seat::Seat1, Seat::Seat2];

    pub fn opponent(self) -> Seat {
        match self {
            Seat::Seat1 => Seat::Seat2,
            Seat::Seat2 => Seat::Seat1,
        }
    }

    /// Zero-based index, for per-seat arrays.
    pub fn index(self) -> usize {
        match self {
            Seat::Seat1 => 0,
            Seat::Seat2 => 1,
        }
    }

    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seat {}", self.number())
    }
}

/// Written as `"good"`/`"bad"`; the capitalised `"Good"`/`"Bad"` also decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    #[serde(alias = "Good")]
    Good,
    #[serde(alias = "Bad")]
    Bad,
}

impl PieceKind {
    pub fn label(self) -> &'static str {
        match self {
            PieceKind::Good => "good",
            PieceKind::Bad => "bad",
        }
    }
}

/// A board square as `(row, col)`.
///
/// Coordinates are signed so that out-of-range squares sent by a peer still
/// decode and can be rejected by the rules instead of the parser. On the wire
/// a cell is the two-element array `[row, col]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Cell {
    pub row: i32,
    pub col: i32,
}

impl Cell {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(self) -> bool {
        let size = BOARD_SIZE as i32;
        (0..size).contains(&self.row) && (0..size).contains(&self.col)
    }

    /// Array indices for this cell, or `None` when it lies off the board.
    pub fn index(self) -> Option<(usize, usize)> {
        if self.in_bounds() {
            Some((self.row as usize, self.col as usize))
        } else {
            None
        }
    }

    pub fn manhattan_distance(self, other: Cell) -> i32 {
        (self.row - other.row).abs() + (self.col - other.col).abs()
    }

    /// The orthogonal neighbours of this cell that lie on the board.
    pub fn neighbours(self) -> impl Iterator<Item = Cell> {
        [(-1, 0), (1, 0), (0, -1), (0, 1)]
            .into_iter()
            .map(move |(dr, dc)| Cell::new(self.row + dr, self.col + dc))
            .filter(|cell| cell.in_bounds())
    }
}

impl From<[i32; 2]> for Cell {
    fn from([row, col]: [i32; 2]) -> Self {
        Cell::new(row, col)
    }
}

impl From<Cell> for [i32; 2] {
    fn from(cell: Cell) -> Self {
        [cell.row, cell.col]
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// One entry of a setup batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub row: i32,
    pub col: i32,
    pub kind: PieceKind,
}

impl Placement {
    pub fn new(cell: Cell, kind: PieceKind) -> Self {
        Self {
            row: cell.row,
            col: cell.col,
            kind,
        }
    }

    pub fn cell(&self) -> Cell {
        Cell::new(self.row, self.col)
    }
}

/// What one seat is allowed to see of a board square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellView {
    Empty,
    OwnGood,
    OwnBad,
    /// An opponent piece whose kind stays hidden.
    Opponent,
}

pub type BoardView = [[CellView; BOARD_SIZE]; BOARD_SIZE];

/// Records sent by a player to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Nickname { name: String },
    Setup { placements: Vec<Placement> },
    Move { from: Cell, to: Cell },
}

/// Records sent by the server to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AssignSeat {
        seat: Seat,
        display_identity: u64,
        my_nickname: String,
        opponent_nickname: String,
    },
    WaitOpponent,
    StartSetup,
    SetupInvalid {
        message: String,
    },
    Info {
        message: String,
    },
    UpdateState {
        board: BoardView,
        my_seat: Seat,
        current_seat: Option<Seat>,
        my_good_captured_by_opponent: u8,
        my_bad_captured_by_opponent: u8,
        opponent_good_captured_by_me: u8,
        opponent_bad_captured_by_me: u8,
        last_action_description: String,
        my_nickname: String,
        opponent_nickname: String,
    },
    YourTurn,
    OpponentTurn,
    InvalidMove {
        message: String,
    },
    GameOver {
        winner: Option<Seat>,
        reason: String,
    },
    Error {
        message: String,
    },
}
