//! Per-connection plumbing: the boxed byte stream, and the reader and writer
//! tasks that bind one seat of a room to its socket.
//!
//! Each seated connection is split in two. The reader task frames inbound
//! lines and applies them to the room under its lock; the writer task drains
//! the seat's outbox onto the socket. Either side failing turns into a
//! forfeit for that seat.

use crate::lobby::Lobby;
use crate::room::{PlayerIdentity, Room, RoomId};
use log::{debug, error, info, warn};
use shared::{decode_line, encode_line, ClientMessage, CodecError, LineBuffer, Seat, ServerMessage};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use thiserror::Error;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf,
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

const READ_CHUNK: usize = 2048;

/// Any byte stream a player can be connected through.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedTransport = Box<dyn Transport>;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// An accepted connection that has not been seated yet.
pub struct Connection {
    identity: PlayerIdentity,
    peer: String,
    stream: BoxedTransport,
    /// Bytes read while checking liveness, replayed once the seat's reader starts.
    early: Vec<u8>,
}

impl Connection {
    pub fn new(identity: PlayerIdentity, peer: impl Into<String>, stream: impl Transport) -> Self {
        Self {
            identity,
            peer: peer.into(),
            stream: Box::new(stream),
            early: Vec::new(),
        }
    }

    pub fn identity(&self) -> PlayerIdentity {
        self.identity
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Writes one record straight to the stream.
    pub async fn send(&mut self, msg: &ServerMessage) -> Result<(), ConnectionError> {
        write_message(&mut self.stream, msg).await
    }

    /// Checks without blocking whether the peer is still there.
    ///
    /// Anything the peer already sent is kept for the seat's reader. Returns
    /// false once the stream reports end of file or an error.
    pub async fn is_alive(&mut self) -> bool {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let polled = std::future::poll_fn(|cx| {
                let mut buf = ReadBuf::new(&mut chunk);
                let result = match Pin::new(&mut self.stream).poll_read(cx, &mut buf) {
                    Poll::Pending => None,
                    Poll::Ready(Ok(())) => Some(Ok(buf.filled().len())),
                    Poll::Ready(Err(e)) => Some(Err(e)),
                };
                Poll::Ready(result)
            })
            .await;

            match polled {
                None => return true,
                Some(Ok(0)) => return false,
                Some(Ok(n)) => {
                    if self.early.len() + n > shared::MAX_LINE_LEN * 2 {
                        return false;
                    }
                    self.early.extend_from_slice(&chunk[..n]);
                }
                Some(Err(e)) => {
                    debug!("Player {} failed liveness check: {}", self.identity, e);
                    return false;
                }
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error closing connection of player {}: {}", self.identity, e);
        }
    }
}

/// What a seat's tasks need to reach their room.
#[derive(Clone)]
pub struct SeatContext {
    pub room_id: RoomId,
    pub seat: Seat,
    pub identity: PlayerIdentity,
    pub room: Arc<Mutex<Room>>,
    pub lobby: Arc<Lobby>,
}

/// Spawns the reader and writer tasks for a seated connection and returns
/// the writer's handle, which completes once everything queued for the seat
/// has been flushed.
pub fn spawn_seat(
    conn: Connection,
    ctx: SeatContext,
    outbound: mpsc::UnboundedReceiver<ServerMessage>,
    closed: watch::Receiver<bool>,
) -> JoinHandle<()> {
    debug!(
        "Room {}: seating player {} ({}) as {}",
        ctx.room_id,
        conn.identity(),
        conn.peer(),
        ctx.seat
    );
    let (reader, writer) = tokio::io::split(conn.stream);

    tokio::spawn(read_loop(reader, conn.early, ctx.clone(), closed));
    tokio::spawn(write_loop(writer, ctx, outbound))
}

async fn read_loop(
    mut reader: ReadHalf<BoxedTransport>,
    early: Vec<u8>,
    ctx: SeatContext,
    mut closed: watch::Receiver<bool>,
) {
    let mut buffer = [0u8; READ_CHUNK];
    let mut lines = LineBuffer::new();

    if !early.is_empty() {
        lines.extend(&early);
        match dispatch_lines(&mut lines, &ctx).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!("Dropping player {}: {}", ctx.identity, e);
                forfeit(&ctx).await;
                return;
            }
        }
    }

    loop {
        if *closed.borrow() {
            return;
        }

        let read = tokio::select! {
            _ = closed.changed() => return,
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => {
                info!("Player {} closed the connection", ctx.identity);
                break;
            }
            Ok(n) => {
                lines.extend(&buffer[..n]);
                match dispatch_lines(&mut lines, &ctx).await {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Dropping player {}: {}", ctx.identity, e);
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("Error reading from player {}: {}", ctx.identity, e);
                break;
            }
        }
    }

    forfeit(&ctx).await;
}

/// Applies every complete buffered line to the room. Returns true once the
/// room has ended.
async fn dispatch_lines(lines: &mut LineBuffer, ctx: &SeatContext) -> Result<bool, CodecError> {
    while let Some(line) = lines.next_line()? {
        if line.trim().is_empty() {
            continue;
        }

        let msg = match decode_line::<ClientMessage>(&line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    "Room {}: discarding record from player {}: {}",
                    ctx.room_id, ctx.identity, e
                );
                continue;
            }
        };

        let finished = {
            let mut room = ctx.room.lock().await;
            room.handle(ctx.seat, msg);
            room.is_terminal()
        };
        if finished {
            ctx.lobby.remove_room(ctx.room_id).await;
            return Ok(true);
        }
    }

    Ok(false)
}

async fn write_loop(
    mut writer: WriteHalf<BoxedTransport>,
    ctx: SeatContext,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = write_message(&mut writer, &msg).await {
            error!("Failed to write to player {}: {}", ctx.identity, e);
            forfeit(&ctx).await;
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Error shutting down writer of player {}: {}", ctx.identity, e);
    }
}

async fn write_message<W>(writer: &mut W, msg: &ServerMessage) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let line = encode_line(msg)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// The seat lost its connection. Serialised by the room lock, so a room
/// whose two connections fail together is torn down once.
async fn forfeit(ctx: &SeatContext) {
    ctx.room.lock().await.disconnect(ctx.seat);
    ctx.lobby.remove_room(ctx.room_id).await;
}
