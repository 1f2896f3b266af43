mod common;

use common::{enqueue, processor, CountingHandler, PanickingHandler, PanickingStore};
use leaseflow::jobs::{
    boxed, ErrorClass, ErrorCode, JobError, JobRecord, JobRegistry, MemoryJobStore, WorkerPool,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn batch(store: &MemoryJobStore, job_type: &str, n: usize) -> Vec<JobRecord> {
    (0..n).map(|_| enqueue(store, job_type)).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_batch_returns_no_outcomes() {
    let store = Arc::new(MemoryJobStore::new());
    let pool = WorkerPool::new(processor(JobRegistry::new(), store), 4);

    assert!(pool.process_jobs(Vec::new()).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn one_outcome_per_job_for_any_worker_count() {
    for workers in [0, 1, 3, 10, 50] {
        let handler = CountingHandler::ok("export.csv");
        let calls = handler.calls();
        let registry = JobRegistry::new();
        registry.register(handler).unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let records = batch(&store, "export.csv", 10);
        let expected: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();

        let outcomes = processor(registry, store.clone())
            .process_jobs_concurrently(records, workers)
            .await;

        assert_eq!(outcomes.len(), 10, "workers={workers}");
        let seen: HashSet<String> = outcomes.iter().map(|o| o.job_id.clone()).collect();
        assert_eq!(seen, expected, "workers={workers}");
        assert!(outcomes.iter().all(|o| o.is_ok()), "workers={workers}");
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert!(store.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn panic_outside_the_handler_still_yields_an_outcome() {
    let handler = CountingHandler::ok("export.csv");
    let calls = handler.calls();
    let registry = JobRegistry::new();
    registry.register(handler).unwrap();

    let inner = MemoryJobStore::new();
    let records = batch(&inner, "export.csv", 3);
    let poisoned = records[1].id.clone();
    let store = Arc::new(PanickingStore {
        inner,
        panic_on: poisoned.clone(),
    });

    let outcomes = processor(registry, store.clone())
        .process_jobs_concurrently(records, 2)
        .await;

    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        if outcome.job_id == poisoned {
            let err = outcome.result.as_ref().unwrap_err();
            assert!(matches!(err, JobError::Aborted { .. }), "{err}");
            assert!(err.to_string().contains("connection pool poisoned"), "{err}");
            assert_eq!(err.code(), ErrorCode::WorkerAborted);
            assert_eq!(err.class(), ErrorClass::Recoverable);
            assert!(!err.counts_as_attempt());
        } else {
            assert!(outcome.is_ok(), "{:?}", outcome.result);
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let row = store.inner.find(&poisoned).unwrap();
    assert_eq!(row.attempts, 0);
    assert_eq!(store.inner.len(), 1);
}

#[test]
fn zero_workers_means_one() {
    let store = Arc::new(MemoryJobStore::new());
    let pool = WorkerPool::new(processor(JobRegistry::new(), store), 0);
    assert_eq!(pool.workers(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn mixed_batch_with_an_unregistered_type() {
    let exports = CountingHandler::ok("export.csv");
    let export_calls = exports.calls();
    let deletes = CountingHandler::failing("batch.delete", "permission denied");
    let delete_calls = deletes.calls();
    let registry = JobRegistry::new();
    registry.register(exports).unwrap();
    registry.register(deletes).unwrap();

    let store = Arc::new(MemoryJobStore::new());
    let mut records = batch(&store, "export.csv", 4);
    records.extend(batch(&store, "batch.delete", 3));
    let unknown = batch(&store, "report.pdf", 3);
    let unknown_ids: HashSet<String> = unknown.iter().map(|r| r.id.clone()).collect();
    records.extend(unknown);

    let outcomes = processor(registry, store.clone())
        .process_jobs_concurrently(records, 4)
        .await;

    assert_eq!(outcomes.len(), 10);
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 4);

    let handler_failures = outcomes
        .iter()
        .filter(|o| matches!(o.result, Err(JobError::Handler(_))))
        .count();
    assert_eq!(handler_failures, 3);

    for outcome in outcomes.iter().filter(|o| unknown_ids.contains(&o.job_id)) {
        let err = outcome.result.as_ref().unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownJobType);
    }

    assert_eq!(export_calls.load(Ordering::SeqCst), 4);
    assert_eq!(delete_calls.load(Ordering::SeqCst), 3);
    // Failed and unknown jobs are requeued, successful ones are gone.
    assert_eq!(store.len(), 6);
    assert!(store
        .eligible(Duration::from_secs(300), 100)
        .iter()
        .all(|r| r.attempts == 1 && r.reserved_at.is_empty()));
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_jobs_do_not_stop_their_siblings() {
    let registry = JobRegistry::new();
    registry.register(CountingHandler::ok("export.csv")).unwrap();
    registry
        .register(PanickingHandler {
            job_type: "explode",
            message: "boom",
        })
        .unwrap();

    let store = Arc::new(MemoryJobStore::new());
    let mut records = batch(&store, "explode", 2);
    records.extend(batch(&store, "export.csv", 6));

    let outcomes = WorkerPool::new(processor(registry, store.clone()), 2)
        .process_jobs(records)
        .await;

    assert_eq!(outcomes.len(), 8);
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 6);
    assert_eq!(store.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn workers_run_jobs_concurrently() {
    let barrier = Arc::new(Barrier::new(3));
    let registry = JobRegistry::new();
    {
        let barrier = barrier.clone();
        registry
            .register_fn("sync", move |_ctx, _job| {
                let barrier = barrier.clone();
                boxed(async move {
                    barrier.wait().await;
                    Ok(())
                })
            })
            .unwrap();
    }
    let store = Arc::new(MemoryJobStore::new());
    let records = batch(&store, "sync", 3);

    // Three jobs can only pass the barrier together.
    let outcomes = tokio::time::timeout(
        Duration::from_secs(10),
        processor(registry, store).process_jobs_concurrently(records, 3),
    )
    .await
    .expect("jobs should run in parallel");

    assert!(outcomes.iter().all(|o| o.is_ok()));
}

#[tokio::test(flavor = "multi_thread")]
async fn in_flight_jobs_never_exceed_worker_count() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let registry = JobRegistry::new();
    {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        registry
            .register_fn("slow", move |_ctx, _job| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                boxed(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .unwrap();
    }
    let store = Arc::new(MemoryJobStore::new());
    let records = batch(&store, "slow", 12);

    let outcomes = processor(registry, store)
        .process_jobs_concurrently(records, 3)
        .await;

    assert_eq!(outcomes.len(), 12);
    assert!(peak.load(Ordering::SeqCst) <= 3);
}
