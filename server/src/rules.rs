//! Rules engine: placement validation, move legality, capture and win detection.
//!
//! Everything here is deterministic and free of I/O. The only mutation is the
//! explicit board update in [`place_batch`], [`apply_move`] and [`apply_capture`].

use shared::{Cell, PieceKind, Placement, Seat, BOARD_SIZE, PIECES_PER_KIND, PIECES_PER_SEAT};
use std::collections::HashSet;
use thiserror::Error;

/// Columns every seat may use during setup.
pub const SETUP_COLS: [i32; 4] = [1, 2, 3, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub owner: Seat,
    pub kind: PieceKind,
}

impl Piece {
    pub fn new(owner: Seat, kind: PieceKind) -> Self {
        Self { owner, kind }
    }
}

/// The 6x6 playing field. A square holds at most one piece.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    squares: [[Option<Piece>; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Piece on `cell`; `None` for empty or off-board squares.
    pub fn get(&self, cell: Cell) -> Option<Piece> {
        let (row, col) = cell.index()?;
        self.squares[row][col]
    }

    /// Puts `piece` on `cell`, returning what was there. Off-board cells are ignored.
    pub fn put(&mut self, cell: Cell, piece: Piece) -> Option<Piece> {
        let (row, col) = cell.index()?;
        self.squares[row][col].replace(piece)
    }

    pub fn take(&mut self, cell: Cell) -> Option<Piece> {
        let (row, col) = cell.index()?;
        self.squares[row][col].take()
    }

    pub fn pieces(&self) -> impl Iterator<Item = (Cell, Piece)> + '_ {
        self.squares.iter().enumerate().flat_map(|(row, line)| {
            line.iter().enumerate().filter_map(move |(col, square)| {
                square.map(|piece| (Cell::new(row as i32, col as i32), piece))
            })
        })
    }

    pub fn count(&self, owner: Seat, kind: PieceKind) -> usize {
        self.pieces()
            .filter(|(_, piece)| piece.owner == owner && piece.kind == kind)
            .count()
    }
}

/// Opponent pieces captured by one seat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureTally {
    pub good: u8,
    pub bad: u8,
}

impl CaptureTally {
    pub fn record(&mut self, kind: PieceKind) {
        let slot = match kind {
            PieceKind::Good => &mut self.good,
            PieceKind::Bad => &mut self.bad,
        };
        *slot = (*slot + 1).min(PIECES_PER_KIND as u8);
    }
}

/// Capture tallies of both seats, indexed by the capturing seat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tallies {
    by_seat: [CaptureTally; 2],
}

impl Tallies {
    pub fn of(&self, seat: Seat) -> CaptureTally {
        self.by_seat[seat.index()]
    }

    pub fn of_mut(&mut self, seat: Seat) -> &mut CaptureTally {
        &mut self.by_seat[seat.index()]
    }
}

/// Tunable parts of the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesConfig {
    /// Escape corners per seat, indexed by `Seat::index`.
    pub escape_corners: [[Cell; 2]; 2],
}

impl Default for RulesConfig {
    /// Each seat escapes on the far edge from its own setup rows.
    fn default() -> Self {
        Self {
            escape_corners: [
                [Cell::new(5, 0), Cell::new(5, 5)],
                [Cell::new(0, 0), Cell::new(0, 5)],
            ],
        }
    }
}

impl RulesConfig {
    pub fn escape_corners(&self, seat: Seat) -> [Cell; 2] {
        self.escape_corners[seat.index()]
    }

    pub fn is_escape_corner(&self, seat: Seat, cell: Cell) -> bool {
        self.escape_corners(seat).contains(&cell)
    }
}

pub fn setup_rows(seat: Seat) -> [i32; 2] {
    match seat {
        Seat::Seat1 => [0, 1],
        Seat::Seat2 => [4, 5],
    }
}

pub fn in_setup_region(seat: Seat, cell: Cell) -> bool {
    setup_rows(seat).contains(&cell.row) && SETUP_COLS.contains(&cell.col)
}

/// The eight cells a seat may place pieces on.
pub fn setup_region(seat: Seat) -> Vec<Cell> {
    setup_rows(seat)
        .into_iter()
        .flat_map(|row| SETUP_COLS.into_iter().map(move |col| Cell::new(row, col)))
        .collect()
}

/// Why a setup batch was refused. The `Display` text is sent to the player.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupRejection {
    #[error("You need to place exactly 8 pieces (got {0}).")]
    WrongCount(usize),

    #[error("You need 4 Good and 4 Bad pieces (got {good} Good and {bad} Bad).")]
    WrongMix { good: usize, bad: usize },

    #[error("Square {cell} is outside your setup area (rows {first_row} and {last_row}, columns 1 to 4).")]
    OutsideRegion {
        cell: Cell,
        first_row: i32,
        last_row: i32,
    },

    #[error("Square {0} already holds one of your pieces.")]
    DuplicateCell(Cell),
}

/// Why a move was refused. The `Display` text is sent to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("Invalid coordinates.")]
    OutOfBounds,

    #[error("You cannot move the piece on that square.")]
    NotYourPiece,

    #[error("Pieces move exactly one square up, down, left or right.")]
    NotAdjacent,

    #[error("The target square holds your own piece.")]
    OwnPieceAtTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinReason {
    /// The winner captured every Good piece of the opponent.
    CapturedAllGood,
    /// Every Bad piece of the winner was captured.
    LostAllBad,
    /// A Good piece of the winner reached one of its escape corners.
    Escaped,
}

pub fn validate_placement_batch(seat: Seat, batch: &[Placement]) -> Result<(), SetupRejection> {
    if batch.len() != PIECES_PER_SEAT {
        return Err(SetupRejection::WrongCount(batch.len()));
    }

    let good = batch.iter().filter(|p| p.kind == PieceKind::Good).count();
    let bad = batch.len() - good;
    if good != PIECES_PER_KIND || bad != PIECES_PER_KIND {
        return Err(SetupRejection::WrongMix { good, bad });
    }

    let mut seen = HashSet::with_capacity(PIECES_PER_SEAT);
    for placement in batch {
        let cell = placement.cell();
        if !in_setup_region(seat, cell) {
            let [first_row, last_row] = setup_rows(seat);
            return Err(SetupRejection::OutsideRegion {
                cell,
                first_row,
                last_row,
            });
        }
        if !seen.insert(cell) {
            return Err(SetupRejection::DuplicateCell(cell));
        }
    }

    Ok(())
}

/// Writes an already validated batch onto the board.
pub fn place_batch(board: &mut Board, seat: Seat, batch: &[Placement]) {
    for placement in batch {
        board.put(placement.cell(), Piece::new(seat, placement.kind));
    }
}

/// Checks a move for `seat` and returns the piece that would move.
pub fn validate_move(board: &Board, seat: Seat, from: Cell, to: Cell) -> Result<Piece, MoveRejection> {
    if !from.in_bounds() || !to.in_bounds() {
        return Err(MoveRejection::OutOfBounds);
    }

    let piece = match board.get(from) {
        Some(piece) if piece.owner == seat => piece,
        _ => return Err(MoveRejection::NotYourPiece),
    };

    if from.manhattan_distance(to) != 1 {
        return Err(MoveRejection::NotAdjacent);
    }

    if matches!(board.get(to), Some(target) if target.owner == seat) {
        return Err(MoveRejection::OwnPieceAtTarget);
    }

    Ok(piece)
}

/// Removes whatever stands on `to` and returns it.
pub fn apply_capture(board: &mut Board, to: Cell) -> Option<Piece> {
    board.take(to)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub moved: Piece,
    pub captured: Option<Piece>,
}

/// Moves the piece on `from` to `to`, capturing any occupant. The move must
/// already have passed [`validate_move`].
pub fn apply_move(board: &mut Board, from: Cell, to: Cell) -> Option<MoveOutcome> {
    let moved = board.take(from)?;
    let captured = apply_capture(board, to);
    board.put(to, moved);
    Some(MoveOutcome { moved, captured })
}

/// Decides whether the move just made by `mover` ended the game.
///
/// Conditions are checked in a fixed order and the first match wins:
/// all opponent Good captured, mover's Bad all lost to the opponent (read
/// from the opponent's tally, so the mover wins), the opponent's Bad all
/// lost to the mover (the opponent wins), then escape.
pub fn evaluate_win(
    tallies: &Tallies,
    moved_kind: PieceKind,
    mover: Seat,
    to: Cell,
    rules: &RulesConfig,
) -> Option<(Seat, WinReason)> {
    let other = mover.opponent();
    let full = PIECES_PER_KIND as u8;

    if tallies.of(mover).good >= full {
        return Some((mover, WinReason::CapturedAllGood));
    }
    if tallies.of(other).bad >= full {
        return Some((mover, WinReason::LostAllBad));
    }
    if tallies.of(mover).bad >= full {
        return Some((other, WinReason::LostAllBad));
    }
    if moved_kind == PieceKind::Good && rules.is_escape_corner(mover, to) {
        return Some((mover, WinReason::Escaped));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_batch(seat: Seat) -> Vec<Placement> {
        setup_region(seat)
            .into_iter()
            .enumerate()
            .map(|(i, cell)| {
                let kind = if i % 2 == 0 { PieceKind::Good } else { PieceKind::Bad };
                Placement::new(cell, kind)
            })
            .collect()
    }

    fn tallies(seat1: CaptureTally, seat2: CaptureTally) -> Tallies {
        let mut tallies = Tallies::default();
        *tallies.of_mut(Seat::Seat1) = seat1;
        *tallies.of_mut(Seat::Seat2) = seat2;
        tallies
    }

    #[test]
    fn test_setup_region_has_eight_cells() {
        for seat in Seat::ALL {
            let region = setup_region(seat);
            assert_eq!(region.len(), PIECES_PER_SEAT);
            assert!(region.iter().all(|cell| in_setup_region(seat, *cell)));
        }
        assert!(setup_region(Seat::Seat1).contains(&Cell::new(1, 4)));
        assert!(!in_setup_region(Seat::Seat1, Cell::new(0, 0)));
        assert!(!in_setup_region(Seat::Seat2, Cell::new(1, 1)));
    }

    #[test]
    fn test_accepts_standard_batch() {
        for seat in Seat::ALL {
            assert_eq!(validate_placement_batch(seat, &standard_batch(seat)), Ok(()));
        }
    }

    #[test]
    fn test_rejects_wrong_count() {
        let mut batch = standard_batch(Seat::Seat1);
        batch.pop();
        assert_eq!(
            validate_placement_batch(Seat::Seat1, &batch),
            Err(SetupRejection::WrongCount(7))
        );
        assert_eq!(
            validate_placement_batch(Seat::Seat1, &[]),
            Err(SetupRejection::WrongCount(0))
        );
    }

    #[test]
    fn test_rejects_five_good_three_bad() {
        let mut batch = standard_batch(Seat::Seat1);
        let first_bad = batch.iter().position(|p| p.kind == PieceKind::Bad).unwrap();
        batch[first_bad].kind = PieceKind::Good;

        let err = validate_placement_batch(Seat::Seat1, &batch).unwrap_err();
        assert_eq!(err, SetupRejection::WrongMix { good: 5, bad: 3 });
        assert!(err.to_string().contains("need 4 Good and 4 Bad"));
    }

    #[test]
    fn test_rejects_cell_outside_region() {
        let mut batch = standard_batch(Seat::Seat2);
        batch[3] = Placement::new(Cell::new(4, 0), batch[3].kind);

        assert_eq!(
            validate_placement_batch(Seat::Seat2, &batch),
            Err(SetupRejection::OutsideRegion {
                cell: Cell::new(4, 0),
                first_row: 4,
                last_row: 5,
            })
        );

        let other_half = standard_batch(Seat::Seat1);
        assert!(matches!(
            validate_placement_batch(Seat::Seat2, &other_half),
            Err(SetupRejection::OutsideRegion { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_cell() {
        let mut batch = standard_batch(Seat::Seat1);
        batch[7] = Placement::new(batch[0].cell(), batch[7].kind);

        assert_eq!(
            validate_placement_batch(Seat::Seat1, &batch),
            Err(SetupRejection::DuplicateCell(batch[0].cell()))
        );
    }

    #[test]
    fn test_place_batch_fills_region() {
        let mut board = Board::new();
        place_batch(&mut board, Seat::Seat2, &standard_batch(Seat::Seat2));

        assert_eq!(board.pieces().count(), 8);
        assert_eq!(board.count(Seat::Seat2, PieceKind::Good), 4);
        assert_eq!(board.count(Seat::Seat2, PieceKind::Bad), 4);
        assert!(board.pieces().all(|(cell, _)| in_setup_region(Seat::Seat2, cell)));
    }

    #[test]
    fn test_move_legality() {
        let mut board = Board::new();
        board.put(Cell::new(2, 2), Piece::new(Seat::Seat1, PieceKind::Good));
        board.put(Cell::new(2, 3), Piece::new(Seat::Seat1, PieceKind::Bad));
        board.put(Cell::new(3, 2), Piece::new(Seat::Seat2, PieceKind::Bad));

        let from = Cell::new(2, 2);
        assert!(validate_move(&board, Seat::Seat1, from, Cell::new(1, 2)).is_ok());
        assert!(validate_move(&board, Seat::Seat1, from, Cell::new(2, 1)).is_ok());
        assert!(validate_move(&board, Seat::Seat1, from, Cell::new(3, 2)).is_ok());

        assert_eq!(
            validate_move(&board, Seat::Seat1, from, Cell::new(3, 3)),
            Err(MoveRejection::NotAdjacent)
        );
        assert_eq!(
            validate_move(&board, Seat::Seat1, from, Cell::new(0, 2)),
            Err(MoveRejection::NotAdjacent)
        );
        assert_eq!(
            validate_move(&board, Seat::Seat1, from, from),
            Err(MoveRejection::NotAdjacent)
        );
        assert_eq!(
            validate_move(&board, Seat::Seat1, from, Cell::new(2, 3)),
            Err(MoveRejection::OwnPieceAtTarget)
        );
        assert_eq!(
            validate_move(&board, Seat::Seat2, from, Cell::new(1, 2)),
            Err(MoveRejection::NotYourPiece)
        );
        assert_eq!(
            validate_move(&board, Seat::Seat1, Cell::new(4, 4), Cell::new(4, 5)),
            Err(MoveRejection::NotYourPiece)
        );
        assert_eq!(
            validate_move(&board, Seat::Seat1, from, Cell::new(2, 6)),
            Err(MoveRejection::OutOfBounds)
        );
        assert_eq!(
            validate_move(&board, Seat::Seat1, Cell::new(-1, 2), from),
            Err(MoveRejection::OutOfBounds)
        );
    }

    #[test]
    fn test_apply_move_captures_opponent() {
        let mut board = Board::new();
        let mover = Piece::new(Seat::Seat1, PieceKind::Good);
        let victim = Piece::new(Seat::Seat2, PieceKind::Bad);
        board.put(Cell::new(2, 2), mover);
        board.put(Cell::new(3, 2), victim);

        let outcome = apply_move(&mut board, Cell::new(2, 2), Cell::new(3, 2)).unwrap();

        assert_eq!(outcome.moved, mover);
        assert_eq!(outcome.captured, Some(victim));
        assert_eq!(board.get(Cell::new(3, 2)), Some(mover));
        assert_eq!(board.get(Cell::new(2, 2)), None);
        assert_eq!(board.pieces().count(), 1);
    }

    #[test]
    fn test_apply_move_to_empty_square() {
        let mut board = Board::new();
        board.put(Cell::new(0, 1), Piece::new(Seat::Seat1, PieceKind::Bad));

        let outcome = apply_move(&mut board, Cell::new(0, 1), Cell::new(0, 0)).unwrap();
        assert_eq!(outcome.captured, None);
        assert!(board.get(Cell::new(0, 0)).is_some());
    }

    #[test]
    fn test_tally_is_bounded() {
        let mut tally = CaptureTally::default();
        for _ in 0..6 {
            tally.record(PieceKind::Bad);
        }
        tally.record(PieceKind::Good);
        assert_eq!(tally, CaptureTally { good: 1, bad: 4 });
    }

    #[test]
    fn test_no_win_on_quiet_move() {
        let rules = RulesConfig::default();
        let tallies = tallies(CaptureTally { good: 3, bad: 3 }, CaptureTally { good: 3, bad: 3 });
        assert_eq!(
            evaluate_win(&tallies, PieceKind::Good, Seat::Seat1, Cell::new(4, 0), &rules),
            None
        );
    }

    #[test]
    fn test_default_escape_corners_are_far_edge() {
        let rules = RulesConfig::default();
        let none = Tallies::default();

        assert_eq!(
            evaluate_win(&none, PieceKind::Good, Seat::Seat1, Cell::new(5, 5), &rules),
            Some((Seat::Seat1, WinReason::Escaped))
        );
        assert_eq!(
            evaluate_win(&none, PieceKind::Good, Seat::Seat2, Cell::new(0, 0), &rules),
            Some((Seat::Seat2, WinReason::Escaped))
        );
        // Own-side corners and Bad pieces never escape.
        assert_eq!(
            evaluate_win(&none, PieceKind::Good, Seat::Seat1, Cell::new(0, 0), &rules),
            None
        );
        assert_eq!(
            evaluate_win(&none, PieceKind::Bad, Seat::Seat1, Cell::new(5, 0), &rules),
            None
        );
    }

    #[test]
    fn test_captured_all_good_outranks_everything() {
        let rules = RulesConfig::default();
        let tallies = tallies(CaptureTally { good: 4, bad: 4 }, CaptureTally { good: 0, bad: 4 });

        assert_eq!(
            evaluate_win(&tallies, PieceKind::Good, Seat::Seat1, Cell::new(5, 0), &rules),
            Some((Seat::Seat1, WinReason::CapturedAllGood))
        );
    }

    #[test]
    fn test_mover_bad_loss_outranks_opponent_bad_loss() {
        let rules = RulesConfig::default();
        // Seat2 captured all of Seat1's Bad pieces and Seat1 captured all of Seat2's.
        let tallies = tallies(CaptureTally { good: 0, bad: 4 }, CaptureTally { good: 0, bad: 4 });

        assert_eq!(
            evaluate_win(&tallies, PieceKind::Bad, Seat::Seat1, Cell::new(3, 3), &rules),
            Some((Seat::Seat1, WinReason::LostAllBad))
        );
    }

    #[test]
    fn test_capturing_last_bad_hands_win_to_owner() {
        let rules = RulesConfig::default();
        let tallies = tallies(CaptureTally { good: 1, bad: 4 }, CaptureTally::default());

        assert_eq!(
            evaluate_win(&tallies, PieceKind::Good, Seat::Seat1, Cell::new(3, 3), &rules),
            Some((Seat::Seat2, WinReason::LostAllBad))
        );
    }

    #[test]
    fn test_bad_loss_outranks_escape() {
        let rules = RulesConfig::default();
        let tallies = tallies(CaptureTally { good: 0, bad: 4 }, CaptureTally::default());

        assert_eq!(
            evaluate_win(&tallies, PieceKind::Good, Seat::Seat1, Cell::new(5, 0), &rules),
            Some((Seat::Seat2, WinReason::LostAllBad))
        );
    }

    #[test]
    fn test_custom_escape_corners() {
        let rules = RulesConfig {
            escape_corners: [
                [Cell::new(0, 0), Cell::new(0, 5)],
                [Cell::new(5, 0), Cell::new(5, 5)],
            ],
        };
        assert!(rules.is_escape_corner(Seat::Seat1, Cell::new(0, 0)));
        assert!(!rules.is_escape_corner(Seat::Seat1, Cell::new(5, 0)));
    }
}
