//! Reservation hot-path benchmarks
//!
//! Measures the engine overhead (retry wrapper, logging, metrics, domain rules) on
//! top of the in-memory store:
//! - reserve + fulfill of a single hold
//! - availability read with many live holds
//! - order number allocation
//!
//! Run with: `cargo bench -p boxoffice-runtime`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use boxoffice_core::{SequenceKey, SessionId};
use boxoffice_runtime::{EngineConfig, ReservationEngine};
use boxoffice_testing::{InMemoryInventoryStore, InMemorySequenceStore, ManualClock, helpers};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;

fn engine() -> ReservationEngine {
    ReservationEngine::new(
        Arc::new(InMemoryInventoryStore::new()),
        Arc::new(InMemorySequenceStore::new()),
        Arc::new(ManualClock::default()),
        EngineConfig::default(),
    )
}

fn bench_reserve_fulfill(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let engine = engine();
    let tt = runtime
        .block_on(engine.ledger().register(helpers::ticket_type("GA", None)))
        .expect("register");

    let mut group = c.benchmark_group("reservations");
    group.throughput(Throughput::Elements(1));
    group.bench_function("reserve_then_fulfill", |b| {
        b.to_async(&runtime).iter(|| async {
            let hold = engine
                .reservations()
                .reserve(tt.id, 1, SessionId::new("bench"), None)
                .await
                .expect("reserve");
            black_box(engine.reservations().fulfill(hold.id).await.expect("fulfill"));
        });
    });
    group.finish();
}

fn bench_availability(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let engine = engine();
    let tt = runtime
        .block_on(engine.ledger().register(helpers::ticket_type("GA", Some(100_000))))
        .expect("register");
    runtime.block_on(async {
        for i in 0..1_000 {
            engine
                .reservations()
                .reserve(tt.id, 1, SessionId::new(format!("s{i}")), None)
                .await
                .expect("reserve");
        }
    });

    c.bench_function("availability_with_1000_holds", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(engine.availability().available(tt.id).await.expect("read")) });
    });
}

fn bench_sequence(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let engine = engine();
    let key = SequenceKey::new("ALCBF", 2026).expect("key");

    c.bench_function("next_order_number", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(engine.sequences().next_number(&key).await.expect("next")) });
    });
}

criterion_group!(benches, bench_reserve_fulfill, bench_availability, bench_sequence);
criterion_main!(benches);
