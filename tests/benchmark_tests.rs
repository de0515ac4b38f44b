//! Performance benchmarks for the rules engine and wire codec

use server::room::project_board;
use server::rules::{
    apply_move, evaluate_win, place_batch, setup_region, validate_move, validate_placement_batch,
    Board, RulesConfig, Tallies,
};
use shared::{decode_line, encode_line, Cell, ClientMessage, PieceKind, Placement, Seat};
use std::time::Instant;

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

fn opening_board() -> Board {
    let mut board = Board::new();
    for seat in Seat::ALL {
        place_batch(&mut board, seat, &standard_batch(seat));
    }
    board
}

/// Benchmarks move validation over every square pair of an opening board
#[test]
fn benchmark_move_validation() {
    let board = opening_board();
    let cells: Vec<Cell> = (0..6)
        .flat_map(|row| (0..6).map(move |col| Cell::new(row, col)))
        .collect();

    let iterations = 100;
    let start = Instant::now();
    let mut legal = 0;

    for _ in 0..iterations {
        for &from in &cells {
            for &to in &cells {
                if validate_move(&board, Seat::Seat1, from, to).is_ok() {
                    legal += 1;
                }
            }
        }
    }

    let duration = start.elapsed();
    let checks = iterations * cells.len() * cells.len();
    println!(
        "Move validation: {} checks in {:?} ({:.2} ns/check)",
        checks,
        duration,
        duration.as_nanos() as f64 / checks as f64
    );

    // Front row: four steps forward plus two sideways; back row: two sideways
    assert_eq!(legal, iterations * 8);
    assert!(duration.as_millis() < 500);
}

/// Benchmarks setup validation
#[test]
fn benchmark_setup_validation() {
    let batch = standard_batch(Seat::Seat2);

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        assert!(validate_placement_batch(Seat::Seat2, &batch).is_ok());
    }

    let duration = start.elapsed();
    println!(
        "Setup validation: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks a move followed by win evaluation and both projections
#[test]
fn benchmark_move_and_projection() {
    let rules = RulesConfig::default();
    let tallies = Tallies::default();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut board = opening_board();
        let outcome = apply_move(&mut board, Cell::new(1, 1), Cell::new(2, 1)).unwrap();
        let to = Cell::new(2, 1);
        assert!(evaluate_win(&tallies, outcome.moved.kind, Seat::Seat1, to, &rules).is_none());

        let _ = project_board(&board, Seat::Seat1);
        let _ = project_board(&board, Seat::Seat2);
    }

    let duration = start.elapsed();
    println!(
        "Move + projection: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks encoding and decoding of client records
#[test]
fn benchmark_codec() {
    let msg = ClientMessage::Setup {
        placements: standard_batch(Seat::Seat1),
    };

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let line = encode_line(&msg).unwrap();
        let decoded: ClientMessage = decode_line(&line).unwrap();
        assert_eq!(decoded, msg);
    }

    let duration = start.elapsed();
    println!(
        "Codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}
