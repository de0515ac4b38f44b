//! One paired game: seat bookkeeping, the setup/play state machine, and the
//! per-seat views pushed back to the players.
//!
//! A `Room` never touches a socket. Outbound records are queued on each
//! seat's [`Outbox`] and written by that connection's writer task, so every
//! method here runs to completion while the caller holds the room lock.

use crate::rules::{
    apply_move, evaluate_win, place_batch, validate_move, validate_placement_batch, Board,
    RulesConfig, Tallies, WinReason,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    BoardView, Cell, CellView, ClientMessage, PieceKind, Placement, Seat, ServerMessage,
    BOARD_SIZE,
};
use tokio::sync::{mpsc, watch};

pub type RoomId = u64;
pub type PlayerIdentity = u64;

pub const MAX_NICKNAME_CHARS: usize = 32;

const NOT_STARTED: &str = "The game has not started yet.";
const NOT_YOUR_TURN: &str = "It is not your turn.";
const ALREADY_OVER: &str = "The game is already over.";
const SETUP_ALREADY_SUBMITTED: &str = "Setup already submitted.";
const SETUP_DONE_WAITING: &str = "Setup complete, waiting for opponent...";
const GAME_STARTED: &str = "Game started!";
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingNicknames,
    Setup,
    Play,
    Terminal,
}

/// Queue of records waiting to be written to one connection.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { tx }
    }

    /// Queues `msg`. Returns false once the writer task has gone away.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

#[derive(Debug)]
struct SeatState {
    identity: PlayerIdentity,
    nickname: Option<String>,
    outbox: Option<Outbox>,
    setup_done: bool,
}

impl SeatState {
    fn new(identity: PlayerIdentity, outbox: Outbox) -> Self {
        Self {
            identity,
            nickname: None,
            outbox: Some(outbox),
            setup_done: false,
        }
    }
}

pub struct Room {
    id: RoomId,
    seats: [SeatState; 2],
    board: Board,
    tallies: Tallies,
    turn: Option<Seat>,
    phase: Phase,
    rules: RulesConfig,
    rng: StdRng,
    closed: watch::Sender<bool>,
}

impl Room {
    /// Creates a room for two freshly paired players. The first pair member
    /// takes Seat1.
    pub fn new(
        id: RoomId,
        seat1: (PlayerIdentity, Outbox),
        seat2: (PlayerIdentity, Outbox),
        rules: RulesConfig,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        info!("Room {} created: player {} (seat 1) vs player {} (seat 2)", id, seat1.0, seat2.0);

        Self {
            id,
            seats: [SeatState::new(seat1.0, seat1.1), SeatState::new(seat2.0, seat2.1)],
            board: Board::new(),
            tallies: Tallies::default(),
            turn: None,
            phase: Phase::AwaitingNicknames,
            rules,
            rng: StdRng::from_entropy(),
            closed,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turn(&self) -> Option<Seat> {
        self.turn
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn tallies(&self) -> Tallies {
        self.tallies
    }

    pub fn identity(&self, seat: Seat) -> PlayerIdentity {
        self.seats[seat.index()].identity
    }

    /// Fires once the room has closed both connections.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Announces seats with placeholder nicknames and opens setup.
    pub fn start(&mut self) {
        self.announce_seats();
        self.broadcast(ServerMessage::StartSetup);
    }

    /// Applies one inbound record from `seat`.
    pub fn handle(&mut self, seat: Seat, msg: ClientMessage) {
        debug!("Room {}: {} sent {:?}", self.id, seat, msg);

        match msg {
            ClientMessage::Nickname { name } => self.on_nickname(seat, name),
            ClientMessage::Setup { placements } => self.on_setup(seat, &placements),
            ClientMessage::Move { from, to } => self.on_move(seat, from, to),
        }
    }

    /// Ends the game by forfeit after `seat` lost its connection. Returns
    /// false when the room had already ended.
    pub fn disconnect(&mut self, seat: Seat) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.phase = Phase::Terminal;

        let winner = seat.opponent();
        info!(
            "Room {}: player {} disconnected, player {} wins by forfeit",
            self.id,
            self.identity(seat),
            self.identity(winner)
        );
        self.send(
            winner,
            ServerMessage::GameOver {
                winner: Some(winner),
                reason: format!("Opponent player {} disconnected.", self.identity(seat)),
            },
        );
        self.close();
        true
    }

    /// Ends the game without a winner because the server is stopping.
    pub fn shutdown(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.phase = Phase::Terminal;

        info!("Room {}: closing for server shutdown", self.id);
        self.broadcast(ServerMessage::GameOver {
            winner: None,
            reason: SHUTDOWN_NOTICE.to_string(),
        });
        self.close();
        true
    }

    fn on_nickname(&mut self, seat: Seat, name: String) {
        if !matches!(self.phase, Phase::AwaitingNicknames | Phase::Setup) {
            warn!("Room {}: ignoring nickname from {} after setup", self.id, seat);
            return;
        }
        let state = &mut self.seats[seat.index()];
        if state.nickname.is_some() {
            warn!("Room {}: ignoring repeated nickname from {}", self.id, seat);
            return;
        }

        let name: String = name.trim().chars().take(MAX_NICKNAME_CHARS).collect();
        state.nickname = Some(if name.is_empty() {
            placeholder_nickname(seat)
        } else {
            name
        });

        if self.seats.iter().all(|s| s.nickname.is_some()) {
            self.announce_seats();
            if self.phase == Phase::AwaitingNicknames {
                self.phase = Phase::Setup;
            }
        }
    }

    fn on_setup(&mut self, seat: Seat, placements: &[Placement]) {
        match self.phase {
            Phase::AwaitingNicknames | Phase::Setup => {}
            Phase::Play | Phase::Terminal => {
                warn!("Room {}: ignoring setup from {} outside setup", self.id, seat);
                return;
            }
        }

        if self.seats[seat.index()].setup_done {
            self.send(
                seat,
                ServerMessage::SetupInvalid {
                    message: SETUP_ALREADY_SUBMITTED.to_string(),
                },
            );
            return;
        }

        if let Err(rejection) = validate_placement_batch(seat, placements) {
            debug!("Room {}: setup from {} rejected: {}", self.id, seat, rejection);
            self.send(
                seat,
                ServerMessage::SetupInvalid {
                    message: rejection.to_string(),
                },
            );
            return;
        }

        place_batch(&mut self.board, seat, placements);
        self.seats[seat.index()].setup_done = true;
        self.phase = Phase::Setup;

        if self.seats.iter().all(|s| s.setup_done) {
            self.start_game();
        } else {
            self.send(
                seat,
                ServerMessage::Info {
                    message: SETUP_DONE_WAITING.to_string(),
                },
            );
        }
    }

    fn start_game(&mut self) {
        let first = if self.rng.gen_bool(0.5) {
            Seat::Seat1
        } else {
            Seat::Seat2
        };
        self.turn = Some(first);
        self.phase = Phase::Play;

        info!(
            "Room {}: game started, player {} moves first",
            self.id,
            self.identity(first)
        );
        self.broadcast_state(GAME_STARTED);
    }

    fn on_move(&mut self, seat: Seat, from: Cell, to: Cell) {
        match self.phase {
            Phase::AwaitingNicknames | Phase::Setup => {
                self.reject_move(seat, NOT_STARTED);
                return;
            }
            // Only reachable through `handle` directly: the outboxes are
            // dropped as the room turns terminal, so no client sees this.
            Phase::Terminal => {
                self.reject_move(seat, ALREADY_OVER);
                return;
            }
            Phase::Play => {}
        }

        if self.turn != Some(seat) {
            self.reject_move(seat, NOT_YOUR_TURN);
            return;
        }

        if let Err(rejection) = validate_move(&self.board, seat, from, to) {
            self.reject_move(seat, &rejection.to_string());
            self.send(seat, ServerMessage::YourTurn);
            return;
        }

        let Some(outcome) = apply_move(&mut self.board, from, to) else {
            return;
        };

        let mut description = format!(
            "Player {} moved from {} to {}",
            self.identity(seat),
            from,
            to
        );
        if let Some(captured) = outcome.captured {
            self.tallies.of_mut(seat).record(captured.kind);
            description.push_str(&format!(
                ", capturing a {} piece of player {}!",
                captured.kind.label(),
                self.identity(captured.owner)
            ));
        }

        match evaluate_win(&self.tallies, outcome.moved.kind, seat, to, &self.rules) {
            Some((winner, reason)) => self.finish(winner, reason, &description),
            None => {
                self.turn = Some(seat.opponent());
                self.broadcast_state(&description);
            }
        }
    }

    fn finish(&mut self, winner: Seat, reason: WinReason, description: &str) {
        let loser = winner.opponent();
        let reason = match reason {
            WinReason::CapturedAllGood => format!(
                "Player {} captured all good pieces of player {}!",
                self.identity(winner),
                self.identity(loser)
            ),
            WinReason::LostAllBad => format!(
                "All bad pieces of player {} were captured by player {}; player {} wins!",
                self.identity(winner),
                self.identity(loser),
                self.identity(winner)
            ),
            WinReason::Escaped => format!(
                "A good piece of player {} escaped!",
                self.identity(winner)
            ),
        };

        self.phase = Phase::Terminal;
        info!("Room {}: game over. {}", self.id, reason);

        for seat in Seat::ALL {
            let view = self.state_view(seat, description);
            self.send(seat, view);
        }
        self.broadcast(ServerMessage::GameOver {
            winner: Some(winner),
            reason,
        });
        self.close();
    }

    fn reject_move(&self, seat: Seat, message: &str) {
        self.send(
            seat,
            ServerMessage::InvalidMove {
                message: message.to_string(),
            },
        );
    }

    /// Sends every seat its view followed by its turn notice.
    fn broadcast_state(&self, description: &str) {
        for seat in Seat::ALL {
            self.send(seat, self.state_view(seat, description));
            let notice = if self.turn == Some(seat) {
                ServerMessage::YourTurn
            } else {
                ServerMessage::OpponentTurn
            };
            self.send(seat, notice);
        }
    }

    fn announce_seats(&self) {
        for seat in Seat::ALL {
            self.send(
                seat,
                ServerMessage::AssignSeat {
                    seat,
                    display_identity: self.identity(seat),
                    my_nickname: self.nickname(seat),
                    opponent_nickname: self.nickname(seat.opponent()),
                },
            );
        }
    }

    /// The `update_state` record as `seat` is allowed to see it.
    pub fn state_view(&self, seat: Seat, description: &str) -> ServerMessage {
        let mine = self.tallies.of(seat);
        let theirs = self.tallies.of(seat.opponent());

        ServerMessage::UpdateState {
            board: project_board(&self.board, seat),
            my_seat: seat,
            current_seat: self.turn,
            my_good_captured_by_opponent: theirs.good,
            my_bad_captured_by_opponent: theirs.bad,
            opponent_good_captured_by_me: mine.good,
            opponent_bad_captured_by_me: mine.bad,
            last_action_description: description.to_string(),
            my_nickname: self.nickname(seat),
            opponent_nickname: self.nickname(seat.opponent()),
        }
    }

    fn nickname(&self, seat: Seat) -> String {
        self.seats[seat.index()]
            .nickname
            .clone()
            .unwrap_or_else(|| placeholder_nickname(seat))
    }

    fn send(&self, seat: Seat, msg: ServerMessage) {
        if let Some(outbox) = &self.seats[seat.index()].outbox {
            if !outbox.send(msg) {
                debug!("Room {}: outbox of {} is closed", self.id, seat);
            }
        }
    }

    fn broadcast(&self, msg: ServerMessage) {
        for seat in Seat::ALL {
            self.send(seat, msg.clone());
        }
    }

    /// Drops both outboxes so the writer tasks flush and hang up, and wakes
    /// the reader tasks.
    fn close(&mut self) {
        for state in &mut self.seats {
            state.outbox = None;
        }
        self.closed.send_replace(true);
    }
}

pub fn placeholder_nickname(seat: Seat) -> String {
    format!("Player {}", seat.number())
}

/// Projects the board for one seat: own pieces show their kind, opponent
/// pieces only show that something is there.
pub fn project_board(board: &Board, seat: Seat) -> BoardView {
    let mut view = [[CellView::Empty; BOARD_SIZE]; BOARD_SIZE];
    for (cell, piece) in board.pieces() {
        let Some((row, col)) = cell.index() else {
            continue;
        };
        view[row][col] = match (piece.owner == seat, piece.kind) {
            (true, PieceKind::Good) => CellView::OwnGood,
            (true, PieceKind::Bad) => CellView::OwnBad,
            (false, _) => CellView::Opponent,
        };
    }
    view
}
