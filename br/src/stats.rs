//! Worker statistics and aggregation
//!
//! Each worker owns one [`WorkerStats`] and is the only writer to it; the
//! collector reads the counters without ever blocking the pool (plain
//! atomics, no locks).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Per-worker counters
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub worker_id: usize,
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
    latency_ms: AtomicU64,
}

impl WorkerStats {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }

    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, latency: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.latency_ms.fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.latency_ms.fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_rate_limit(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms.load(Ordering::Relaxed)
    }
}

/// Aggregated view across all workers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rate_limited: u64,
    /// succeeded / attempted, 0.0 when nothing was attempted
    pub success_rate: f64,
    /// Mean latency over completed attempts (success or failure)
    pub mean_latency_ms: f64,
}

/// Read-only aggregation over the pool's worker stats
pub struct StatsCollector {
    workers: Vec<Arc<WorkerStats>>,
}

impl StatsCollector {
    /// Create stats slots for `worker_count` workers
    pub fn new(worker_count: usize) -> Self {
        Self {
            workers: (0..worker_count).map(|id| Arc::new(WorkerStats::new(id))).collect(),
        }
    }

    /// Stats slot for one worker
    pub fn worker(&self, worker_id: usize) -> Arc<WorkerStats> {
        self.workers[worker_id].clone()
    }

    /// Aggregate all workers into one snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut attempted = 0;
        let mut succeeded = 0;
        let mut failed = 0;
        let mut rate_limited = 0;
        let mut latency_ms = 0;

        for worker in &self.workers {
            attempted += worker.attempted();
            succeeded += worker.succeeded();
            failed += worker.failed();
            rate_limited += worker.rate_limited();
            latency_ms += worker.latency_ms();
        }

        let completed_attempts = succeeded + failed;
        StatsSnapshot {
            attempted,
            succeeded,
            failed,
            rate_limited,
            success_rate: if attempted > 0 {
                succeeded as f64 / attempted as f64
            } else {
                0.0
            },
            mean_latency_ms: if completed_attempts > 0 {
                latency_ms as f64 / completed_attempts as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let collector = StatsCollector::new(4);
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.attempted, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.mean_latency_ms, 0.0);
    }

    #[test]
    fn test_aggregation_across_workers() {
        let collector = StatsCollector::new(2);

        let w0 = collector.worker(0);
        w0.record_attempt();
        w0.record_success(Duration::from_millis(100));

        let w1 = collector.worker(1);
        w1.record_attempt();
        w1.record_attempt();
        w1.record_failure(Duration::from_millis(50));
        w1.record_rate_limit();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.attempted, 3);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.rate_limited, 1);
        assert!((snapshot.success_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((snapshot.mean_latency_ms - 75.0).abs() < 1e-9);
    }
}
