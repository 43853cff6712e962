//! Benchmarks for latency prediction and message routing
//!
//! Run with: cargo bench --bench latency

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::hint::black_box;
use turnsync::network::messages::events;
use turnsync::{
    LatencyPredictor, MessageRouter, NetworkQualityGrader, Transport, TransportError, WireMessage,
};
use web_time::Instant;

/// Discards everything it is given.
struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        let _ = black_box(message);
        Ok(())
    }
}

/// Samples around 80ms with a little deterministic jitter.
fn samples(count: usize) -> Vec<f64> {
    (0..count).map(|i| 80.0 + ((i * 37) % 11) as f64 - 5.0).collect()
}

fn bench_predictor(c: &mut Criterion) {
    let mut group = c.benchmark_group("Latency predictor");

    for count in [10, 100, 1000] {
        let input = samples(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("update", count), &input, |b, input| {
            b.iter(|| {
                let mut predictor = LatencyPredictor::new();
                for &sample in input {
                    predictor.update(black_box(sample));
                }
                predictor.predict()
            });
        });
    }

    let mut warm = LatencyPredictor::new();
    for sample in samples(100) {
        warm.update(sample);
    }
    group.bench_function("jitter", |b| b.iter(|| black_box(&warm).jitter()));

    group.finish();
}

fn bench_quality(c: &mut Criterion) {
    let mut grader = NetworkQualityGrader::new();
    for sample in samples(100) {
        grader.record_ping(sample);
    }
    grader.record_loss();
    c.bench_function("Network quality analyze", |b| {
        b.iter(|| black_box(&grader).analyze());
    });
}

fn bench_router(c: &mut Criterion) {
    let mut group = c.benchmark_group("Message router");

    for queued in [1, 8, 32] {
        group.throughput(Throughput::Elements(queued as u64));
        group.bench_with_input(BenchmarkId::new("batch flush", queued), &queued, |b, &queued| {
            let mut router = MessageRouter::new();
            let mut transport = NullTransport;
            let now = Instant::now();
            b.iter(|| {
                for i in 0..queued {
                    let event = if i % 2 == 0 { events::TELEMETRY } else { "chat" };
                    let _ = router.route(event, json!({ "i": i }), &mut transport, now);
                }
                router.flush(&mut transport)
            });
        });
    }

    group.bench_function("priority send", |b| {
        let mut router = MessageRouter::new();
        let mut transport = NullTransport;
        let now = Instant::now();
        b.iter(|| router.route(events::TOKEN_MOVE, json!({ "to": 5 }), &mut transport, now));
    });

    group.finish();
}

criterion_group!(benches, bench_predictor, bench_quality, bench_router);
criterion_main!(benches);
