//! Integration tests for WorkerPool
//!
//! These tests validate real-world functionality including:
//! - True parallelism across execution units
//! - FIFO queueing when every unit is busy
//! - Per-task result routing under out-of-order completion
//! - Crash supervision and roster self-healing
//! - Processing failures, deadlines and queue bounds
//! - Termination semantics

use async_trait::async_trait;
use rand::Rng;
use resume_parse_pool::config::WorkerPoolConfig;
use resume_parse_pool::core::{PoolError, ProcessingError, TaskMetadata, WorkerExecutor, WorkerPool};
use resume_parse_pool::util::init_tracing;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// TEST EXECUTORS
// ============================================================================

/// Sleeps for the requested time and echoes the label back
#[derive(Clone)]
struct SleepExecutor;

#[async_trait]
impl WorkerExecutor<(String, u64), String> for SleepExecutor {
    async fn process(&self, payload: (String, u64), _meta: TaskMetadata) -> Result<String, ProcessingError> {
        let (label, delay_ms) = payload;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(format!("parsed:{label}"))
    }
}

/// Panics on negative input, fails on odd input, doubles everything else
#[derive(Clone)]
struct FaultyExecutor;

#[async_trait]
impl WorkerExecutor<i64, i64> for FaultyExecutor {
    async fn process(&self, payload: i64, _meta: TaskMetadata) -> Result<i64, ProcessingError> {
        assert!(payload >= 0, "induced crash on {payload}");
        if payload % 2 == 1 {
            return Err(ProcessingError::new(format!("odd input {payload}")));
        }
        Ok(payload * 2)
    }
}

/// Tracks the peak number of simultaneously running tasks
#[derive(Clone)]
struct ConcurrencyProbe {
    running: Arc<AtomicU64>,
    peak: Arc<AtomicU64>,
}

impl ConcurrencyProbe {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicU64::new(0)),
            peak: Arc::new(AtomicU64::new(0)),
        }
    }

    fn peak(&self) -> u64 {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerExecutor<u64, u64> for ConcurrencyProbe {
    async fn process(&self, payload: u64, _meta: TaskMetadata) -> Result<u64, ProcessingError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // Blocking sleep: simulates CPU-bound work holding the thread.
        std::thread::sleep(Duration::from_millis(50));
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(payload)
    }
}

fn sleep_pool(size: usize) -> WorkerPool<(String, u64), String, SleepExecutor> {
    init_tracing();
    WorkerPool::new(WorkerPoolConfig::new().with_pool_size(size), SleepExecutor)
        .expect("Failed to create pool")
}

// ============================================================================
// TESTS
// ============================================================================

/// N tasks of duration T on N units finish in about T, not N x T
#[tokio::test]
async fn test_true_parallelism() {
    let pool = sleep_pool(4);

    let start = Instant::now();
    let handles: Vec<_> = (0..4)
        .map(|i| pool.execute((format!("doc-{i}"), 200)).unwrap())
        .collect();
    let results = futures::future::join_all(handles).await;
    let elapsed = start.elapsed();

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), format!("parsed:doc-{i}"));
    }
    assert!(elapsed >= Duration::from_millis(200));
    assert!(
        elapsed < Duration::from_millis(600),
        "expected parallel execution, took {elapsed:?}"
    );

    pool.terminate().await;
}

/// The (N+1)th task waits for a unit to free up
#[test]
fn test_extra_task_waits_for_free_unit() {
    let pool = sleep_pool(2);

    let start = Instant::now();
    let first = pool.execute(("a".into(), 150)).unwrap();
    let second = pool.execute(("b".into(), 150)).unwrap();
    let third = pool.execute(("c".into(), 150)).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.busy, 2);
    assert_eq!(stats.available, 0);
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.in_flight, 2);

    assert_eq!(third.wait().unwrap(), "parsed:c");
    assert!(
        start.elapsed() >= Duration::from_millis(290),
        "third task started before a unit was free"
    );
    assert_eq!(first.wait().unwrap(), "parsed:a");
    assert_eq!(second.wait().unwrap(), "parsed:b");

    pool.terminate().wait();
}

/// Pool of 2; A and B take 100ms, C takes 10ms and must queue behind them
#[tokio::test]
async fn test_two_units_three_tasks_scenario() {
    let pool = sleep_pool(2);

    let start = Instant::now();
    let a = pool.execute(("A".into(), 100)).unwrap();
    let b = pool.execute(("B".into(), 100)).unwrap();
    let c = pool.execute(("C".into(), 10)).unwrap();

    let (a, b, c) = futures::join!(a, b, c);
    let elapsed = start.elapsed();

    assert_eq!(a.unwrap(), "parsed:A");
    assert_eq!(b.unwrap(), "parsed:B");
    assert_eq!(c.unwrap(), "parsed:C");
    assert!(elapsed >= Duration::from_millis(110), "C ran too early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");

    pool.terminate().await;
}

/// Results arrive out of order but each handle gets its own output
#[tokio::test]
async fn test_out_of_order_completion_routes_results() {
    let pool = sleep_pool(4);
    let mut rng = rand::rng();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let delay = rng.random_range(1..60);
            (i, pool.execute((format!("resume-{i}"), delay)).unwrap())
        })
        .collect();

    for (i, handle) in handles {
        assert_eq!(handle.await.unwrap(), format!("parsed:resume-{i}"));
    }

    let stats = pool.stats();
    assert_eq!(stats.completed_tasks, 16);
    assert_eq!(stats.failed_tasks, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.available, 4);

    pool.terminate().await;
}

/// Units run concurrently on separate OS threads
#[tokio::test]
async fn test_units_run_on_separate_threads() {
    let probe = ConcurrencyProbe::new();
    let pool = WorkerPool::new(WorkerPoolConfig::new().with_pool_size(4), probe.clone()).unwrap();

    let handles: Vec<_> = (0..12).map(|i| pool.execute(i).unwrap()).collect();
    let results: Vec<u64> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(results, (0..12).collect::<Vec<_>>());
    assert!(probe.peak() > 1, "expected concurrent execution");
    assert!(probe.peak() <= 4, "more tasks than units ran at once");

    pool.terminate().await;
}

/// Crashes fail the in-flight task and the roster heals to full size
#[tokio::test]
async fn test_roster_self_heals_after_crashes() {
    init_tracing();
    let pool = WorkerPool::new(WorkerPoolConfig::new().with_pool_size(3), FaultyExecutor).unwrap();

    for round in 0..20_i64 {
        let crash = pool.execute(-1 - round).unwrap();
        match crash.await {
            Err(PoolError::UnitCrashed(reason)) => assert!(reason.contains("induced crash")),
            other => panic!("expected a crash, got {other:?}"),
        }

        let stats = pool.stats();
        assert_eq!(stats.pool_size, 3);
        assert_eq!(stats.live_units, 3, "roster shrank after crash {round}");
        assert_eq!(stats.busy + stats.available, stats.live_units);
    }

    let healthy: Vec<_> = (0..6).map(|i| pool.execute(i * 2).unwrap()).collect();
    for (i, handle) in (0_i64..).zip(healthy) {
        assert_eq!(handle.await.unwrap(), i * 4);
    }

    let stats = pool.stats();
    assert_eq!(stats.crashed_units, 20);
    assert_eq!(stats.live_units, 3);
    assert_eq!(stats.available, 3);

    pool.terminate().await;
}

/// Crashes mixed into a busy queue never lose other tasks
#[tokio::test]
async fn test_crash_under_load_keeps_serving() {
    let pool = WorkerPool::new(WorkerPoolConfig::new().with_pool_size(2), FaultyExecutor).unwrap();

    let handles: Vec<_> = (0..30_i64)
        .map(|i| {
            let payload = if i % 5 == 0 { -i - 1 } else { i * 2 };
            (payload, pool.execute(payload).unwrap())
        })
        .collect();

    for (payload, handle) in handles {
        let result = handle.await;
        if payload < 0 {
            assert!(matches!(result, Err(PoolError::UnitCrashed(_))));
        } else {
            assert_eq!(result.unwrap(), payload * 2);
        }
    }

    let stats = pool.stats();
    assert_eq!(stats.crashed_units, 6);
    assert_eq!(stats.live_units, 2);
    assert_eq!(stats.completed_tasks, 24);

    pool.terminate().await;
}

/// A processing failure reaches the caller and costs no capacity
#[tokio::test]
async fn test_processing_failure_surfaces_once() {
    let pool = WorkerPool::new(WorkerPoolConfig::new().with_pool_size(1), FaultyExecutor).unwrap();

    let err = pool.execute(3).unwrap().await.unwrap_err();
    assert_eq!(err, PoolError::Processing("odd input 3".into()));
    assert_eq!(pool.execute(4).unwrap().await.unwrap(), 8);

    let stats = pool.stats();
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.completed_tasks, 1);
    assert_eq!(stats.crashed_units, 0);
    assert_eq!(stats.available, 1);

    pool.terminate().await;
}

/// A stuck unit is replaced once its task exceeds the deadline
#[tokio::test]
async fn test_deadline_replaces_stuck_unit() {
    let config = WorkerPoolConfig::new()
        .with_pool_size(1)
        .with_task_timeout(Duration::from_millis(100));
    let pool = WorkerPool::new(config, SleepExecutor).unwrap();

    let start = Instant::now();
    let stuck = pool.execute(("stuck".into(), 2_000)).unwrap();
    let next = pool.execute(("next".into(), 10)).unwrap();

    assert_eq!(stuck.await, Err(PoolError::Timeout));
    assert!(start.elapsed() < Duration::from_millis(1_000));
    assert_eq!(next.await.unwrap(), "parsed:next");
    assert!(start.elapsed() < Duration::from_millis(1_000));

    let stats = pool.stats();
    assert_eq!(stats.timed_out_tasks, 1);
    assert_eq!(stats.live_units, 1);
    assert_eq!(stats.available, 1);

    pool.terminate().await;
}

/// A retired unit that finishes late does not count its result or rejoin the roster
#[tokio::test]
async fn test_late_report_from_retired_unit_is_ignored() {
    let config = WorkerPoolConfig::new()
        .with_pool_size(1)
        .with_task_timeout(Duration::from_millis(100));
    let pool = WorkerPool::new(config, SleepExecutor).unwrap();

    let stuck = pool.execute(("slow".into(), 300)).unwrap();
    assert_eq!(stuck.await, Err(PoolError::Timeout));

    // Let the retired unit finish and report.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let stats = pool.stats();
    assert_eq!(stats.completed_tasks, 0);
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.timed_out_tasks, 1);
    assert_eq!(stats.live_units, 1);
    assert_eq!(stats.available, 1);

    let next = pool.execute(("after".into(), 5)).unwrap();
    assert_eq!(next.await.unwrap(), "parsed:after");
    assert_eq!(pool.stats().completed_tasks, 1);

    pool.terminate().await;
}

/// Bounded queue rejects submissions synchronously
#[tokio::test]
async fn test_queue_depth_limit() {
    let config = WorkerPoolConfig::new()
        .with_pool_size(1)
        .with_max_queue_depth(2);
    let pool = WorkerPool::new(config, SleepExecutor).unwrap();

    let mut accepted = Vec::new();
    let mut rejected = 0;
    for i in 0..10 {
        match pool.execute((format!("q-{i}"), 200)) {
            Ok(handle) => accepted.push(handle),
            Err(PoolError::QueueFull) => rejected += 1,
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }

    assert!(rejected > 0, "Expected some rejections");
    // 1 running + 2 queued at most
    assert!(accepted.len() <= 3, "Too many tasks accepted: {}", accepted.len());
    assert!(accepted.len() >= 2);

    for handle in accepted {
        assert!(handle.await.is_ok());
    }
    assert!(pool.execute(("after".into(), 1)).is_ok());

    pool.terminate().await;
}

/// Terminate stops everything and rejects further work
#[tokio::test]
async fn test_terminate_rejects_new_work() {
    let pool = sleep_pool(3);
    assert_eq!(pool.execute(("warm".into(), 5)).unwrap().await.unwrap(), "parsed:warm");

    pool.terminate().await;

    assert!(pool.is_terminated());
    let stats = pool.stats();
    assert_eq!(stats.available, 0);
    assert_eq!(stats.live_units, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.pool_size, 3);

    assert_eq!(pool.execute(("late".into(), 5)).unwrap_err(), PoolError::PoolShutdown);

    // Idempotent.
    pool.terminate().await;
}

/// Tasks still pending at terminate resolve to PoolShutdown rather than hang
#[tokio::test]
async fn test_terminate_drops_pending_tasks() {
    let config = WorkerPoolConfig::new()
        .with_pool_size(1)
        .with_shutdown_grace(Duration::from_millis(50));
    let pool = WorkerPool::new(config, SleepExecutor).unwrap();

    let running = pool.execute(("long".into(), 1_000)).unwrap();
    let queued = pool.execute(("queued".into(), 10)).unwrap();
    assert_eq!(pool.stats().queued, 1);

    let start = Instant::now();
    pool.terminate().await;
    assert!(start.elapsed() < Duration::from_millis(800));

    assert_eq!(running.await, Err(PoolError::PoolShutdown));
    assert_eq!(queued.await, Err(PoolError::PoolShutdown));
}

/// Dropping a pool without terminate does not hang
#[test]
fn test_drop_without_terminate() {
    let pool = sleep_pool(2);
    let handle = pool.execute(("x".into(), 5)).unwrap();
    assert_eq!(handle.wait().unwrap(), "parsed:x");
    drop(pool);
}
