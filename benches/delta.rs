//! Benchmarks for delta compression and checksums
//!
//! Run with: cargo bench --bench delta
//!
//! Boards are sized like real matches: a handful of players, four tokens each, plus a move
//! log that grows over the game.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::hint::black_box;
use turnsync::{apply_delta, compute_checksum, DeltaCompressor};

/// A board with `players` players and a move log of `log_len` entries.
fn board(players: usize, log_len: usize) -> Value {
    let players: Vec<Value> = (0..players)
        .map(|p| json!({ "id": format!("p{}", p), "tokens": [0, 0, 0, 0], "score": 0 }))
        .collect();
    let log: Vec<Value> = (0..log_len)
        .map(|i| json!({ "player": i % 4, "dice": i % 6 + 1, "to": i % 52 }))
        .collect();
    json!({ "turn": log_len, "dice": null, "players": players, "log": log })
}

/// One token move plus the log entry recording it.
fn after_move(base: &Value) -> Value {
    let mut next = base.clone();
    next["players"][0]["tokens"][2] = json!(17);
    next["dice"] = json!(4);
    if let Some(log) = next["log"].as_array_mut() {
        log.push(json!({ "player": 0, "dice": 4, "to": 17 }));
    }
    next
}

fn bench_calculate_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("Calculate delta");

    for log_len in [0, 50, 500] {
        let before = board(4, log_len);
        let after = after_move(&before);
        group.bench_with_input(
            BenchmarkId::new("single move", log_len),
            &(before, after),
            |b, (before, after)| {
                b.iter(|| {
                    let mut compressor = DeltaCompressor::new();
                    compressor.calculate_delta(black_box(before));
                    compressor.calculate_delta(black_box(after))
                });
            },
        );
    }

    let unchanged = board(4, 50);
    group.bench_function("unchanged", |b| {
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&unchanged);
        b.iter(|| compressor.calculate_delta(black_box(&unchanged)));
    });

    group.finish();
}

fn bench_apply_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("Apply delta");

    for log_len in [0, 50, 500] {
        let before = board(4, log_len);
        let after = after_move(&before);
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&before);
        let Some(delta) = compressor.calculate_delta(&after) else {
            continue;
        };
        group.bench_with_input(
            BenchmarkId::new("single move", log_len),
            &(before, delta),
            |b, (before, delta)| {
                b.iter(|| apply_delta(black_box(before), black_box(delta)));
            },
        );
    }

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("Checksum");

    for log_len in [0, 50, 500] {
        let state = board(4, log_len);
        group.bench_with_input(BenchmarkId::new("board", log_len), &state, |b, state| {
            b.iter(|| compute_checksum(black_box(state)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_calculate_delta, bench_apply_delta, bench_checksum);
criterion_main!(benches);
