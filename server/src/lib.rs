//! # Geister Server Library
//!
//! This library provides the authoritative server for a two-player,
//! hidden-information board game played on a 6x6 board. Each player secretly
//! places four good and four bad pieces, then the players take turns moving
//! one piece one square at a time. The server owns every game's true state
//! and only ever tells a player what that player is allowed to know.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! Accepted connections get a unique, increasing player identity and wait in
//! a FIFO queue. As soon as two are queued they are paired into a room: the
//! first to arrive takes seat 1, the second seat 2.
//!
//! ### Authoritative Rules
//! Setup batches and moves are validated before they touch the board. A
//! rejected setup or move never changes state; the player is told why and
//! may try again.
//!
//! ### Per-Seat Views
//! After every state change each seat receives its own projection of the
//! board. Opponent pieces show up only as occupied squares; their kinds are
//! never sent until the game is over.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection Half
//! Every seated connection gets a reader task and a writer task. Readers
//! apply inbound records to their room under the room's lock, so the two
//! players' actions are serialised while sockets are read concurrently.
//! Writers drain an unbounded outbox so no lock is ever held across a
//! socket write.
//!
//! ### Disconnects and Shutdown
//! A read or write failure, a clean close or an overlong line ends the room
//! with a forfeit in favour of the other seat. Shutdown ends every room
//! without a winner and turns away anyone still waiting.
//!
//! ## Module Organization
//!
//! ### Rules Module (`rules`)
//! Pure game logic with no I/O:
//! - Board storage and capture tallies
//! - Setup batch and move validation
//! - Capture resolution and win detection in fixed priority
//!
//! ### Room Module (`room`)
//! One game's state machine, from seat assignment through setup and play to
//! game over, plus the per-seat board projection.
//!
//! ### Lobby Module (`lobby`)
//! Identity counter, waiting queue and the registry of live rooms.
//!
//! ### Connection Module (`connection`)
//! Line framing over a byte stream and the reader/writer tasks of a seat.
//!
//! ### Network Module (`network`)
//! TCP listener, accept loop and graceful shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Accepts players until Ctrl+C, then ends every game without a winner
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod connection;
pub mod lobby;
pub mod network;
pub mod room;
pub mod rules;
