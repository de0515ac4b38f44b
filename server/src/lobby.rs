//! Connection intake and matchmaking
//!
//! The lobby owns the process-wide state shared by every connection:
//! - The identity counter handed out to accepted connections
//! - The FIFO queue of connections waiting for an opponent
//! - The registry of live rooms, keyed by room id
//!
//! All of it sits behind one lock that is never held while a room's own lock
//! is taken, so rooms can deregister themselves without ordering hazards.

use crate::connection::{spawn_seat, Connection, SeatContext};
use crate::room::{Outbox, PlayerIdentity, Room, RoomId, SHUTDOWN_NOTICE};
use crate::rules::RulesConfig;
use log::{debug, info, warn};
use shared::{Seat, ServerMessage};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

struct LobbyState {
    next_identity: PlayerIdentity,
    next_room_id: RoomId,
    waiting: VecDeque<Connection>,
    rooms: HashMap<RoomId, Arc<Mutex<Room>>>,
    writers: Vec<JoinHandle<()>>,
    closed: bool,
}

/// Pairs waiting connections into rooms and tracks the rooms that are live
pub struct Lobby {
    rules: RulesConfig,
    state: Mutex<LobbyState>,
}

impl Lobby {
    /// Creates an empty lobby whose rooms play by `rules`
    pub fn new(rules: RulesConfig) -> Self {
        Self {
            rules,
            state: Mutex::new(LobbyState {
                next_identity: 1,
                next_room_id: 1,
                waiting: VecDeque::new(),
                rooms: HashMap::new(),
                writers: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Hands out the next player identity
    ///
    /// Identities start at 1, strictly increase and are never reused for the
    /// lifetime of the lobby.
    pub async fn next_identity(&self) -> PlayerIdentity {
        let mut state = self.state.lock().await;
        let identity = state.next_identity;
        state.next_identity += 1;
        identity
    }

    /// Queues a connection and pairs it if an opponent is already waiting
    ///
    /// Of the two paired connections, the one that arrived first (lower
    /// identity) takes Seat1. Returns the id of the room created, or `None`
    /// when `conn` was queued or dropped. A connection that cannot receive
    /// its waiting notice is dropped without being queued; queued connections
    /// whose peer has gone away are discarded when they come up for pairing.
    pub async fn enqueue(self: &Arc<Self>, mut conn: Connection) -> Option<RoomId> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                drop(state);
                refuse(conn).await;
                return None;
            }
            if let Some(partner) = pop_live(&mut state).await {
                return Some(self.open_room(&mut state, partner, conn));
            }
        }

        // Written without the lobby lock so a stalled peer cannot block intake.
        if let Err(e) = conn.send(&ServerMessage::WaitOpponent).await {
            warn!(
                "Dropping player {}: failed to send waiting notice: {}",
                conn.identity(),
                e
            );
            return None;
        }

        let mut state = self.state.lock().await;
        if state.closed {
            drop(state);
            refuse(conn).await;
            return None;
        }
        // Someone may have been queued while the notice was in flight.
        if let Some(partner) = pop_live(&mut state).await {
            return Some(self.open_room(&mut state, partner, conn));
        }

        info!("Player {} is waiting for an opponent", conn.identity());
        state.waiting.push_back(conn);
        None
    }

    fn open_room(self: &Arc<Self>, state: &mut LobbyState, a: Connection, b: Connection) -> RoomId {
        let (first, second) = if a.identity() <= b.identity() { (a, b) } else { (b, a) };

        let room_id = state.next_room_id;
        state.next_room_id += 1;

        let (seat1_tx, seat1_rx) = mpsc::unbounded_channel();
        let (seat2_tx, seat2_rx) = mpsc::unbounded_channel();
        let mut room = Room::new(
            room_id,
            (first.identity(), Outbox::new(seat1_tx)),
            (second.identity(), Outbox::new(seat2_tx)),
            self.rules.clone(),
        );
        let closed = room.subscribe_closed();
        room.start();

        let room = Arc::new(Mutex::new(room));
        state.rooms.insert(room_id, Arc::clone(&room));
        state.writers.retain(|writer| !writer.is_finished());

        for (seat, conn, outbound) in [(Seat::Seat1, first, seat1_rx), (Seat::Seat2, second, seat2_rx)] {
            let ctx = SeatContext {
                room_id,
                seat,
                identity: conn.identity(),
                room: Arc::clone(&room),
                lobby: Arc::clone(self),
            };
            let writer = spawn_seat(conn, ctx, outbound, closed.clone());
            state.writers.push(writer);
        }

        room_id
    }

    /// Drops a room from the registry. Returns false if it was already gone.
    pub async fn remove_room(&self, room_id: RoomId) -> bool {
        let removed = self.state.lock().await.rooms.remove(&room_id).is_some();
        if removed {
            info!("Room {} removed", room_id);
        }
        removed
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    pub async fn waiting_count(&self) -> usize {
        self.state.lock().await.waiting.len()
    }

    /// Closes the lobby
    ///
    /// Every live room ends without a winner and every waiting connection is
    /// sent an error notice and closed. Waits up to `grace` for the seated
    /// connections to flush their last records.
    pub async fn shutdown(&self, grace: Duration) {
        let (rooms, waiting, writers) = {
            let mut state = self.state.lock().await;
            state.closed = true;
            (
                state.rooms.drain().map(|(_, room)| room).collect::<Vec<_>>(),
                state.waiting.drain(..).collect::<Vec<_>>(),
                std::mem::take(&mut state.writers),
            )
        };

        info!(
            "Shutting down lobby: {} rooms, {} waiting connections",
            rooms.len(),
            waiting.len()
        );

        for room in rooms {
            room.lock().await.shutdown();
        }

        for mut conn in waiting {
            if let Err(e) = conn.send(&shutdown_error()).await {
                debug!("Failed to notify player {}: {}", conn.identity(), e);
            }
            conn.close().await;
        }

        let deadline = tokio::time::Instant::now() + grace;
        for writer in writers {
            if tokio::time::timeout_at(deadline, writer).await.is_err() {
                warn!("Timed out flushing connections during shutdown");
                break;
            }
        }
    }
}

/// Pops the longest-waiting connection whose peer is still there.
async fn pop_live(state: &mut LobbyState) -> Option<Connection> {
    while let Some(mut candidate) = state.waiting.pop_front() {
        if candidate.is_alive().await {
            return Some(candidate);
        }
        info!("Player {} left while waiting", candidate.identity());
    }
    None
}

async fn refuse(mut conn: Connection) {
    info!("Refusing player {}: lobby is closed", conn.identity());
    if let Err(e) = conn.send(&shutdown_error()).await {
        debug!("Failed to notify player {}: {}", conn.identity(), e);
    }
    conn.close().await;
}

fn shutdown_error() -> ServerMessage {
    ServerMessage::Error {
        message: SHUTDOWN_NOTICE.to_string(),
    }
}
