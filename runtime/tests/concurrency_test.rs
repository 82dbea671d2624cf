//! Concurrency tests.
//!
//! Many tasks hammer the same ticket type or sequence key on a multi-threaded
//! runtime; the results must be equivalent to some serial order.
//!
//! Run with: `cargo test -p boxoffice-runtime --test concurrency_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use boxoffice_core::{InventoryError, SequenceKey, SessionId};
use boxoffice_runtime::{EngineConfig, ReservationEngine, RetryPolicy};
use boxoffice_testing::{FlakyStore, InMemoryInventoryStore, InMemorySequenceStore, ManualClock, helpers};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

fn engine() -> ReservationEngine {
    ReservationEngine::new(
        Arc::new(InMemoryInventoryStore::new()),
        Arc::new(InMemorySequenceStore::new()),
        Arc::new(ManualClock::default()),
        EngineConfig::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_buyers_race_for_the_last_seat() {
    for _ in 0..50 {
        let engine = engine();
        let tt = engine
            .ledger()
            .register(helpers::ticket_type("Last Seat", Some(1)))
            .await
            .unwrap();

        let mut set = JoinSet::new();
        for buyer in ["alice", "bob"] {
            let engine = engine.clone();
            set.spawn(async move {
                engine
                    .reservations()
                    .reserve(tt.id, 1, SessionId::new(buyer), None)
                    .await
            });
        }

        let results: Vec<_> = set.join_all().await;
        let won = results.iter().filter(|r| r.is_ok()).count();
        let lost = results
            .iter()
            .filter(|r| matches!(r, Err(InventoryError::CapacityExceeded { available: 0, .. })))
            .count();
        assert_eq!((won, lost), (1, 1));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_checkouts_never_oversell() {
    let engine = engine();
    let tt = engine
        .ledger()
        .register(helpers::ticket_type("Festival Pass", Some(100)))
        .await
        .unwrap();

    let mut set = JoinSet::new();
    for i in 0..300u32 {
        let engine = engine.clone();
        set.spawn(async move {
            let quantity = i % 3 + 1;
            let hold = engine
                .reservations()
                .reserve(tt.id, quantity, SessionId::new(format!("cart-{i}")), None)
                .await?;
            if i % 5 == 0 {
                engine.reservations().release(hold.id).await?;
                return Ok(0);
            }
            engine.reservations().fulfill(hold.id).await?;
            Ok::<u32, InventoryError>(quantity)
        });
    }

    let mut sold = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(quantity) => sold += quantity,
            Err(InventoryError::CapacityExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let row = engine.ledger().ticket_type(tt.id).await.unwrap();
    assert_eq!(row.sold_count, sold);
    assert!(row.sold_count <= 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fulfill_counts_once() {
    let engine = engine();
    let tt = engine
        .ledger()
        .register(helpers::ticket_type("GA", Some(10)))
        .await
        .unwrap();
    let hold = engine
        .reservations()
        .reserve(tt.id, 4, SessionId::new("double-click"), None)
        .await
        .unwrap();

    let mut set = JoinSet::new();
    for _ in 0..10 {
        let engine = engine.clone();
        set.spawn(async move { engine.reservations().fulfill(hold.id).await });
    }
    let outcomes: Vec<_> = set
        .join_all()
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_new()).count(), 1);
    let sale_ids: HashSet<_> = outcomes.iter().map(|o| o.sale().id).collect();
    assert_eq!(sale_ids.len(), 1);
    assert_eq!(engine.ledger().ticket_type(tt.id).await.unwrap().sold_count, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn alcbf_three_concurrent_orders() {
    let engine = engine();
    let key = SequenceKey::new("ALCBF", 2026).unwrap();

    let mut set = JoinSet::new();
    for _ in 0..3 {
        let engine = engine.clone();
        let key = key.clone();
        set.spawn(async move { engine.sequences().next_number(&key).await.unwrap().number });
    }

    let numbers: HashSet<u64> = set.join_all().await.into_iter().collect();
    assert_eq!(numbers, HashSet::from([1, 2, 3]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn sequence_numbers_are_unique_under_contention() {
    let flaky = Arc::new(FlakyStore::new(InMemorySequenceStore::new()));
    let engine = ReservationEngine::new(
        Arc::new(InMemoryInventoryStore::new()),
        flaky.clone(),
        Arc::new(ManualClock::default()),
        EngineConfig {
            retry: RetryPolicy::builder()
                .max_retries(25)
                .initial_delay(Duration::from_millis(1))
                .build(),
            ..EngineConfig::default()
        },
    );
    let key = SequenceKey::new("ALCBF", 2026).unwrap();
    flaky.fail_next(20);

    let mut set = JoinSet::new();
    for _ in 0..200 {
        let engine = engine.clone();
        let key = key.clone();
        set.spawn(async move { engine.sequences().next_number(&key).await.unwrap().number });
    }

    let mut numbers: Vec<u64> = set.join_all().await;
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=200).collect::<Vec<_>>());
    assert_eq!(
        engine.sequences().current(&key).await.unwrap(),
        Some(200)
    );
}
