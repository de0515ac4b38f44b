//! Headless player for exercising a running server.
//!
//! Sends a nickname, places its pieces at random and answers every turn
//! notice with a random legal move until the game ends.

use clap::Parser;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use server::rules::setup_region;
use shared::{
    decode_line, encode_line, BoardView, Cell, CellView, ClientMessage, PieceKind, Placement, Seat,
    ServerMessage, PIECES_PER_KIND,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to connect to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[clap(short, long, default_value = "12346")]
    port: u16,
    /// Nickname to play under
    #[clap(short, long, default_value = "bot")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let addr = format!("{}:{}", args.host, args.port);
    let stream = TcpStream::connect(&addr).await?;
    info!("Connected to {}", addr);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut rng = StdRng::from_entropy();

    send(&mut writer, &ClientMessage::Nickname { name: args.name }).await?;

    let mut seat: Option<Seat> = None;
    let mut board: Option<BoardView> = None;

    while let Some(line) = lines.next_line().await? {
        let msg: ServerMessage = match decode_line(&line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Ignoring unreadable record: {}", e);
                continue;
            }
        };

        match msg {
            ServerMessage::AssignSeat {
                seat: assigned,
                display_identity,
                my_nickname,
                opponent_nickname,
            } => {
                info!(
                    "Playing {} as player {} ({}) against {}",
                    assigned, display_identity, my_nickname, opponent_nickname
                );
                seat = Some(assigned);
            }
            ServerMessage::WaitOpponent => info!("Waiting for an opponent..."),
            ServerMessage::StartSetup => {
                let seat = seat.ok_or("setup started before a seat was assigned")?;
                send(&mut writer, &random_setup(seat, &mut rng)).await?;
            }
            ServerMessage::SetupInvalid { message } => {
                warn!("Setup rejected: {}", message);
                if let Some(seat) = seat {
                    send(&mut writer, &random_setup(seat, &mut rng)).await?;
                }
            }
            ServerMessage::Info { message } => info!("{}", message),
            ServerMessage::UpdateState {
                board: view,
                last_action_description,
                ..
            } => {
                info!("{}", last_action_description);
                board = Some(view);
            }
            ServerMessage::YourTurn => match board.as_ref().and_then(|view| random_move(view, &mut rng)) {
                Some((from, to)) => {
                    debug!("Moving {} -> {}", from, to);
                    send(&mut writer, &ClientMessage::Move { from, to }).await?;
                }
                None => warn!("No legal move available"),
            },
            ServerMessage::OpponentTurn => debug!("Opponent to move"),
            ServerMessage::InvalidMove { message } => warn!("Move rejected: {}", message),
            ServerMessage::GameOver { winner, reason } => {
                match winner {
                    Some(winner) if Some(winner) == seat => info!("We won: {}", reason),
                    Some(_) => info!("We lost: {}", reason),
                    None => info!("Game ended without a winner: {}", reason),
                }
                break;
            }
            ServerMessage::Error { message } => {
                error!("Server error: {}", message);
                break;
            }
        }
    }

    Ok(())
}

async fn send(writer: &mut OwnedWriteHalf, msg: &ClientMessage) -> Result<(), Box<dyn std::error::Error>> {
    writer.write_all(encode_line(msg)?.as_bytes()).await?;
    Ok(())
}

fn random_setup(seat: Seat, rng: &mut StdRng) -> ClientMessage {
    let mut kinds: Vec<PieceKind> = std::iter::repeat(PieceKind::Good)
        .take(PIECES_PER_KIND)
        .chain(std::iter::repeat(PieceKind::Bad).take(PIECES_PER_KIND))
        .collect();
    kinds.shuffle(rng);

    let placements = setup_region(seat)
        .into_iter()
        .zip(kinds)
        .map(|(cell, kind)| Placement::new(cell, kind))
        .collect();
    ClientMessage::Setup { placements }
}

fn is_own(view: CellView) -> bool {
    matches!(view, CellView::OwnGood | CellView::OwnBad)
}

fn random_move(board: &BoardView, rng: &mut StdRng) -> Option<(Cell, Cell)> {
    let mut candidates = Vec::new();
    for (row, line) in board.iter().enumerate() {
        for (col, square) in line.iter().enumerate() {
            if !is_own(*square) {
                continue;
            }
            let from = Cell::new(row as i32, col as i32);
            for to in from.neighbours() {
                let target = to.index().map(|(r, c)| board[r][c]);
                if !matches!(target, Some(view) if is_own(view)) {
                    candidates.push((from, to));
                }
            }
        }
    }
    candidates.choose(rng).copied()
}
