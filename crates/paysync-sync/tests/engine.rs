//! Sync engine behavior against in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use paysync_core::{Interface, SourceTransaction, TransactionId, TxStatus};
use paysync_store::{FactStore, MemoryStore, StoreError};
use paysync_sync::{shutdown, ReadPolicy, SyncConfig, SyncEngine, SyncError, SyncState};
use rust_decimal::Decimal;

const PIPELINE: &str = "fact_transactions";

fn row(id: i64) -> SourceTransaction {
    let status = match id % 3 {
        0 => TxStatus::reject_tech(),
        1 => TxStatus::Accepted,
        _ => TxStatus::reject_func(),
    };
    SourceTransaction {
        id: TransactionId::new(id),
        interface: Interface::KNOWN[usize::try_from(id).unwrap() % 4].clone(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::minutes(id),
        status,
        amount: Decimal::new(1_000 + id * 7, 2),
    }
}

fn config() -> SyncConfig {
    SyncConfig::default()
        .with_interval(Duration::from_secs(10))
        .with_gate_backoff(Duration::from_secs(5))
        .with_max_backoff(Duration::from_secs(60))
}

struct Fixture {
    source: Arc<MemoryStore>,
    destination: Arc<MemoryStore>,
    engine: SyncEngine,
}

fn fixture(ids: impl IntoIterator<Item = i64>, config: SyncConfig) -> Fixture {
    let source = Arc::new(MemoryStore::with_source("source", ids.into_iter().map(row)));
    let destination = Arc::new(MemoryStore::new("destination"));
    let engine = SyncEngine::new(source.clone(), destination.clone(), config);
    Fixture {
        source,
        destination,
        engine,
    }
}

fn fact_ids(store: &MemoryStore) -> Vec<i64> {
    store.facts().unwrap().iter().map(|f| f.id.get()).collect()
}

// ---------------------------------------------------------------------------
// Single cycles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_cycle_copies_every_row_unchanged() {
    let fx = fixture(1..=5, config());

    let report = fx.engine.run_cycle().await.unwrap();
    assert_eq!(report.read, 5);
    assert_eq!(report.new, 5);
    assert_eq!(report.inserted, 5);

    let facts = fx.destination.facts().unwrap();
    assert_eq!(facts.len(), 5);
    for fact in &facts {
        assert!(fact.matches_source(&row(fact.id.get())));
        assert!(fact.loaded_at >= report.started_at);
    }
}

#[tokio::test]
async fn repeated_cycles_insert_nothing_new() {
    let fx = fixture(1..=4, config());

    fx.engine.run_cycle().await.unwrap();
    let before = fx.destination.facts().unwrap();

    let report = fx.engine.run_cycle().await.unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(fx.destination.facts().unwrap(), before);
}

#[tokio::test]
async fn empty_source_is_a_successful_no_op() {
    let fx = fixture(std::iter::empty(), config());

    let report = fx.engine.run_cycle().await.unwrap();
    assert_eq!(report.read, 0);
    assert_eq!(report.inserted, 0);
    assert_eq!(report.watermark, None);
    assert_eq!(fx.engine.state(), SyncState::Idle);
}

#[tokio::test]
async fn watermark_tracks_highest_id_read() {
    let fx = fixture([2, 5, 9], config());

    let report = fx.engine.run_cycle().await.unwrap();
    assert_eq!(report.watermark, Some(TransactionId::new(9)));
    assert_eq!(
        fx.destination.checkpoint(PIPELINE).await.unwrap(),
        Some(TransactionId::new(9))
    );
}

#[tokio::test]
async fn rows_already_in_destination_are_not_duplicated() {
    let fx = fixture(1..=3, config());
    fx.destination
        .seed_facts([row(2).into_fact(Utc::now())])
        .unwrap();

    let report = fx.engine.run_cycle().await.unwrap();
    assert_eq!(report.read, 3);
    assert_eq!(report.new, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(fact_ids(&fx.destination), vec![1, 2, 3]);
}

#[tokio::test]
async fn later_rows_are_picked_up_by_later_cycles() {
    let fx = fixture(1..=2, config());
    fx.engine.run_cycle().await.unwrap();

    fx.source.push_source(row(3)).unwrap();
    fx.source.push_source(row(4)).unwrap();

    let report = fx.engine.run_cycle().await.unwrap();
    assert_eq!(report.read, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(fact_ids(&fx.destination), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn batched_reads_drain_over_several_cycles() {
    let fx = fixture(1..=7, config().with_batch_size(3));

    let inserted: Vec<u64> = [
        fx.engine.run_cycle().await.unwrap().inserted,
        fx.engine.run_cycle().await.unwrap().inserted,
        fx.engine.run_cycle().await.unwrap().inserted,
        fx.engine.run_cycle().await.unwrap().inserted,
    ]
    .into();

    assert_eq!(inserted, vec![3, 3, 1, 0]);
    assert_eq!(fact_ids(&fx.destination), (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn full_scan_recovers_rows_below_the_watermark() {
    let fx = fixture([1, 2, 5], config().with_read_policy(ReadPolicy::FullScan));
    fx.engine.run_cycle().await.unwrap();

    // A row committed late with a lower id than the watermark.
    fx.source.push_source(row(3)).unwrap();

    let report = fx.engine.run_cycle().await.unwrap();
    assert_eq!(report.read, 4);
    assert_eq!(report.inserted, 1);
    assert_eq!(fact_ids(&fx.destination), vec![1, 2, 3, 5]);
}

#[tokio::test]
async fn splitting_rows_across_cycles_gives_the_same_result() {
    let single = fixture(1..=6, config());
    single.engine.run_cycle().await.unwrap();

    let split = fixture(std::iter::empty(), config());
    for pair in [[1, 2], [3, 4], [5, 6]] {
        for id in pair {
            split.source.push_source(row(id)).unwrap();
        }
        split.engine.run_cycle().await.unwrap();
    }

    let strip = |store: &MemoryStore| -> Vec<_> {
        store
            .facts()
            .unwrap()
            .into_iter()
            .map(|f| (f.id, f.interface, f.timestamp, f.status, f.amount))
            .collect()
    };
    assert_eq!(strip(&single.destination), strip(&split.destination));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_batch_writes_nothing_and_keeps_watermark() {
    let fx = fixture(1..=5, config());
    fx.destination.fail_next_batch_at(3).unwrap();

    let err = fx.engine.run_cycle().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Destination(StoreError::InjectedFailure { row: 3 })
    ));
    assert!(!err.is_connectivity());
    assert!(fx.destination.facts().unwrap().is_empty());
    assert_eq!(fx.destination.checkpoint(PIPELINE).await.unwrap(), None);
    assert_eq!(fx.engine.state(), SyncState::Idle);

    // The next cycle starts over and copies everything.
    let report = fx.engine.run_cycle().await.unwrap();
    assert_eq!(report.inserted, 5);
}

#[tokio::test]
async fn unreachable_source_is_a_connectivity_error() {
    let fx = fixture(1..=3, config());
    fx.source.set_offline(true).unwrap();

    let err = fx.engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));
    assert!(err.is_connectivity());
    assert!(fx.destination.facts().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_destination_is_a_connectivity_error() {
    let fx = fixture(1..=3, config());
    fx.destination.set_offline(true).unwrap();

    let err = fx.engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::Destination(_)));
    assert!(err.is_connectivity());
}

// ---------------------------------------------------------------------------
// Loop and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn loop_runs_on_interval_until_stopped() {
    let fx = Arc::new(fixture(1..=2, config()));
    let (trigger, stop) = shutdown::channel();

    let engine = fx.clone();
    let handle = tokio::spawn(async move { engine.engine.run_loop(stop).await });

    // Cycles at t=0, 10, 20; rows appear before the second one.
    tokio::time::sleep(Duration::from_secs(5)).await;
    fx.source.push_source(row(3)).unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    trigger.stop();

    let stats = handle.await.unwrap();
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.failed_cycles, 0);
    assert_eq!(stats.inserted, 3);
    assert_eq!(fx.engine.state(), SyncState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn loop_backs_off_while_database_is_down() {
    let fx = Arc::new(fixture(1..=4, config()));
    fx.source.set_offline(true).unwrap();
    let (trigger, stop) = shutdown::channel();

    let engine = fx.clone();
    let handle = tokio::spawn(async move { engine.engine.run_loop(stop).await });

    // Failures at t=0, 5, 15, 35; the next attempt waits until t=75.
    tokio::time::sleep(Duration::from_secs(36)).await;
    fx.source.set_offline(false).unwrap();
    assert!(fx.destination.facts().unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(44)).await;
    trigger.stop();

    let stats = handle.await.unwrap();
    assert_eq!(stats.failed_cycles, 4);
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.inserted, 4);
}

#[tokio::test(start_paused = true)]
async fn stop_during_sleep_returns_promptly() {
    let fx = Arc::new(fixture(1..=1, config().with_interval(Duration::from_secs(3600))));
    let (trigger, stop) = shutdown::channel();

    let engine = fx.clone();
    let handle = tokio::spawn(async move { engine.engine.run_loop(stop).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fx.engine.state(), SyncState::Sleeping);

    let stopped_at = tokio::time::Instant::now();
    trigger.stop();
    let stats = handle.await.unwrap();

    assert!(stopped_at.elapsed() < Duration::from_secs(1));
    assert_eq!(stats.cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn run_waits_for_both_databases() {
    let fx = Arc::new(fixture(1..=3, config()));
    fx.source.fail_next_pings(2).unwrap();
    fx.destination.fail_next_pings(1).unwrap();
    let (trigger, stop) = shutdown::channel();

    let engine = fx.clone();
    let handle = tokio::spawn(async move {
        engine
            .engine
            .run(engine.source.as_ref(), engine.destination.as_ref(), stop)
            .await
    });

    // Source ready at t=10, destination at t=15, first cycle right after.
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(fact_ids(&fx.destination), vec![1, 2, 3]);
    trigger.stop();

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.inserted, 3);
    assert_eq!(fx.source.ping_count().unwrap(), 3);
    assert_eq!(fx.destination.ping_count().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_while_waiting_for_database_cancels() {
    let fx = Arc::new(fixture(1..=3, config()));
    fx.source.set_offline(true).unwrap();
    let (trigger, stop) = shutdown::channel();

    let engine = fx.clone();
    let handle = tokio::spawn(async move {
        engine
            .engine
            .run(engine.source.as_ref(), engine.destination.as_ref(), stop)
            .await
    });

    tokio::time::sleep(Duration::from_secs(12)).await;
    trigger.stop();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(fx.source.ping_count().unwrap(), 3);
    assert_eq!(fx.destination.ping_count().unwrap(), 0);
    assert!(fx.destination.facts().unwrap().is_empty());
}
