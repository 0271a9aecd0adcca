//! Worker pool
//!
//! N workers pull from the dispatcher, drive the executor, and own every
//! task state transition. Task ownership transfers exactly once per
//! dequeue, and a task is only re-enqueued after its owning worker has
//! finished handling the outcome, so no two workers ever hold the same
//! task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;
use resultstore::{ResultRecord, ResultStore};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::domain::TaskStatus;
use crate::error::RunError;
use crate::executor::{Executor, Outcome};
use crate::rotation::RateLimitCoordinator;
use crate::stats::{StatsCollector, WorkerStats};

/// A task that spent its whole retry budget
#[derive(Debug, Clone, serde::Serialize)]
pub struct PermanentFailure {
    pub id: String,
    pub reason: String,
}

/// Everything a worker needs, shared across the pool
struct WorkerContext {
    dispatcher: Arc<Dispatcher>,
    coordinator: Arc<RateLimitCoordinator>,
    store: Arc<ResultStore>,
    executor: Arc<dyn Executor>,
    failures: Arc<Mutex<Vec<PermanentFailure>>>,
    /// Tasks not yet completed or permanently failed; the worker that
    /// settles the last one closes the dispatcher
    outstanding: Arc<AtomicUsize>,
}

/// Handle over the spawned workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<Result<(), RunError>>>,
    failures: Arc<Mutex<Vec<PermanentFailure>>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers over the shared queue
    ///
    /// `outstanding` must be the number of tasks enqueued for this run;
    /// the pool closes the dispatcher once they are all settled.
    pub fn spawn(
        worker_count: usize,
        dispatcher: Arc<Dispatcher>,
        coordinator: Arc<RateLimitCoordinator>,
        store: Arc<ResultStore>,
        executor: Arc<dyn Executor>,
        stats: &StatsCollector,
        outstanding: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let outstanding = Arc::new(AtomicUsize::new(outstanding));

        let handles = (0..worker_count)
            .map(|worker_id| {
                let ctx = WorkerContext {
                    dispatcher: dispatcher.clone(),
                    coordinator: coordinator.clone(),
                    store: store.clone(),
                    executor: executor.clone(),
                    failures: failures.clone(),
                    outstanding: outstanding.clone(),
                };
                let worker_stats = stats.worker(worker_id);
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(worker_id, ctx, worker_stats, shutdown))
            })
            .collect();

        info!(worker_count, "Worker pool spawned");
        Self { handles, failures }
    }

    /// Wait for every worker to exit
    ///
    /// Returns the permanent failures and any run-level errors workers
    /// aborted with (store failure, endpoints exhausted).
    pub async fn join(self) -> (Vec<PermanentFailure>, Vec<RunError>) {
        let mut errors = Vec::new();
        for result in futures::future::join_all(self.handles).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => {
                    error!(error = %e, "Worker task panicked");
                }
            }
        }
        let failures = self.failures.lock().await.clone();
        (failures, errors)
    }
}

/// Settle one task (completed or permanently failed); the last settle
/// closes the queue so idle workers see end-of-stream
async fn settle_task(ctx: &WorkerContext) {
    if ctx.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
        debug!("Last task settled, closing dispatcher");
        ctx.dispatcher.close().await;
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: WorkerContext,
    stats: Arc<WorkerStats>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), RunError> {
    debug!(worker_id, "Worker starting");

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Pause here while an endpoint switch is in progress
        ctx.coordinator.wait_ready().await;

        let task = tokio::select! {
            task = ctx.dispatcher.dequeue() => task,
            _ = shutdown.changed() => {
                debug!(worker_id, "Shutdown while waiting for work");
                break;
            }
        };
        let Some(mut task) = task else { break };

        if *shutdown.borrow() {
            // Never silently lose a dequeued task at shutdown
            warn!(worker_id, task_id = %task.id, "Shutdown before execution, requeuing task");
            task.set_status(TaskStatus::Pending);
            ctx.dispatcher.enqueue(task).await;
            break;
        }

        task.set_status(TaskStatus::InFlight);
        let lease = ctx.coordinator.lease().await;
        stats.record_attempt();

        let start = Instant::now();
        // The executor call is atomic from the core's point of view: once
        // started it is never cancelled, even during shutdown.
        let outcome = ctx.executor.execute(&task, &lease.endpoint).await;
        let latency = start.elapsed();

        match outcome {
            Outcome::Success { text } => {
                let record = ResultRecord::new(&task.id, text, worker_id, &lease.endpoint);
                if let Err(e) = ctx.store.append(record).await {
                    error!(worker_id, task_id = %task.id, error = %e, "Append failed, aborting run");
                    task.set_status(TaskStatus::Pending);
                    ctx.dispatcher.enqueue(task).await;
                    ctx.dispatcher.close().await;
                    return Err(e.into());
                }
                task.set_status(TaskStatus::Completed);
                stats.record_success(latency);
                ctx.coordinator.note_success().await;
                info!(
                    worker_id,
                    task_id = %task.id,
                    latency_ms = latency.as_millis() as u64,
                    "Task completed and saved"
                );
                settle_task(&ctx).await;
            }

            Outcome::RateLimited => {
                warn!(worker_id, task_id = %task.id, endpoint = %lease.endpoint, "Rate limit detected");
                task.set_status(TaskStatus::RateLimited);
                stats.record_rate_limit();

                // Back of the queue first, retry budget untouched
                task.set_status(TaskStatus::Pending);
                ctx.dispatcher.enqueue(task).await;

                match ctx.coordinator.report_rate_limit(&lease).await {
                    Ok(true) => debug!(worker_id, "Endpoint rotation performed"),
                    Ok(false) => debug!(worker_id, "Rotation already handled by another worker"),
                    Err(e) => {
                        error!(worker_id, error = %e, "Endpoints exhausted, aborting run");
                        ctx.dispatcher.close().await;
                        return Err(e);
                    }
                }
            }

            Outcome::Failure { reason } => {
                stats.record_failure(latency);
                if task.can_retry() {
                    task.record_failure();
                    warn!(
                        worker_id,
                        task_id = %task.id,
                        retry = task.retry_count,
                        max_retries = task.max_retries,
                        reason = %reason,
                        "Task failed, requeued"
                    );
                    // Jittered pause so a flapping endpoint is not hammered
                    let jitter = rand::rng().random_range(25..150);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                    task.set_status(TaskStatus::Pending);
                    ctx.dispatcher.enqueue(task).await;
                } else {
                    error!(worker_id, task_id = %task.id, reason = %reason, "Task failed permanently");
                    task.set_status(TaskStatus::PermanentlyFailed);
                    ctx.failures.lock().await.push(PermanentFailure {
                        id: task.id.clone(),
                        reason,
                    });
                    settle_task(&ctx).await;
                }
            }
        }
    }

    debug!(worker_id, "Worker exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BatchEntry, Task};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use tempfile::tempdir;

    /// Executor scripted per task id; repeats the last outcome when the
    /// script runs out
    struct ScriptedExecutor {
        scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
        fallback: Outcome,
    }

    impl ScriptedExecutor {
        fn new(fallback: Outcome) -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                fallback,
            }
        }

        async fn script(&self, id: &str, outcomes: Vec<Outcome>) {
            self.scripts.lock().await.insert(id.to_string(), outcomes.into());
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, task: &Task, _endpoint: &str) -> Outcome {
            let mut scripts = self.scripts.lock().await;
            if let Some(queue) = scripts.get_mut(&task.id)
                && let Some(outcome) = queue.pop_front()
            {
                return outcome;
            }
            self.fallback.clone()
        }
    }

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        coordinator: Arc<RateLimitCoordinator>,
        store: Arc<ResultStore>,
        stats: StatsCollector,
        shutdown_tx: watch::Sender<bool>,
        shutdown_rx: watch::Receiver<bool>,
        _temp: tempfile::TempDir,
    }

    fn harness(endpoints: usize) -> Harness {
        let temp = tempdir().unwrap();
        let store = Arc::new(ResultStore::open(temp.path().join("results.json")).unwrap());
        let endpoints = (0..endpoints).map(|i| format!("e{}", i)).collect();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Harness {
            dispatcher: Arc::new(Dispatcher::new()),
            coordinator: Arc::new(RateLimitCoordinator::new(endpoints, Duration::ZERO).unwrap()),
            store,
            stats: StatsCollector::new(4),
            shutdown_tx,
            shutdown_rx,
            _temp: temp,
        }
    }

    fn task(id: &str, max_retries: u32) -> Task {
        Task::new(
            BatchEntry {
                id: id.to_string(),
                payload: "p".to_string(),
            },
            max_retries,
        )
    }

    #[tokio::test]
    async fn test_success_appends_exactly_once() {
        let h = harness(1);
        let executor = Arc::new(ScriptedExecutor::new(Outcome::Success {
            text: "out".to_string(),
        }));

        h.dispatcher.enqueue(task("a", 3)).await;
        h.dispatcher.enqueue(task("b", 3)).await;

        let pool = WorkerPool::spawn(
            2,
            h.dispatcher.clone(),
            h.coordinator.clone(),
            h.store.clone(),
            executor,
            &h.stats,
            2,
            h.shutdown_rx.clone(),
        );
        let (failures, errors) = pool.join().await;

        assert!(failures.is_empty());
        assert!(errors.is_empty());
        assert_eq!(h.store.len().await, 2);
        drop(h.shutdown_tx);
    }

    #[tokio::test]
    async fn test_retry_cap_is_max_retries_plus_one_attempts() {
        let h = harness(1);
        let executor = Arc::new(ScriptedExecutor::new(Outcome::Failure {
            reason: "boom".to_string(),
        }));

        h.dispatcher.enqueue(task("doomed", 2)).await;

        let pool = WorkerPool::spawn(
            1,
            h.dispatcher.clone(),
            h.coordinator.clone(),
            h.store.clone(),
            executor,
            &h.stats,
            1,
            h.shutdown_rx.clone(),
        );
        let (failures, errors) = pool.join().await;

        assert!(errors.is_empty());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, "doomed");
        // max_retries = 2 means exactly 3 attempts
        assert_eq!(h.stats.snapshot().attempted, 3);
        // A permanently failed task never appears in the store
        assert_eq!(h.store.len().await, 0);
        drop(h.shutdown_tx);
    }

    #[tokio::test]
    async fn test_rate_limit_does_not_consume_retry_budget() {
        let h = harness(3);
        let executor = Arc::new(ScriptedExecutor::new(Outcome::Success {
            text: "ok".to_string(),
        }));
        executor
            .script(
                "b",
                vec![Outcome::RateLimited, Outcome::RateLimited, Outcome::Success {
                    text: "late".to_string(),
                }],
            )
            .await;

        h.dispatcher.enqueue(task("b", 3)).await;

        let pool = WorkerPool::spawn(
            1,
            h.dispatcher.clone(),
            h.coordinator.clone(),
            h.store.clone(),
            executor,
            &h.stats,
            1,
            h.shutdown_rx.clone(),
        );
        let (failures, errors) = pool.join().await;

        assert!(failures.is_empty());
        assert!(errors.is_empty());
        assert_eq!(h.store.len().await, 1);
        // Two rate limits rotated the endpoint twice
        assert_eq!(h.coordinator.current_index().await, 2);
        assert_eq!(h.stats.snapshot().rate_limited, 2);
        drop(h.shutdown_tx);
    }

    #[tokio::test]
    async fn test_exhaustion_aborts_with_pending_work() {
        let h = harness(2);
        let executor = Arc::new(ScriptedExecutor::new(Outcome::RateLimited));

        h.dispatcher.enqueue(task("a", 3)).await;

        let pool = WorkerPool::spawn(
            1,
            h.dispatcher.clone(),
            h.coordinator.clone(),
            h.store.clone(),
            executor,
            &h.stats,
            1,
            h.shutdown_rx.clone(),
        );
        let (_, errors) = pool.join().await;

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], RunError::EndpointsExhausted(2)));
        // The task went back to the queue before the abort
        assert_eq!(h.dispatcher.drain().await.len(), 1);
        drop(h.shutdown_tx);
    }

    #[tokio::test]
    async fn test_shutdown_before_execution_keeps_task() {
        let h = harness(1);
        let executor = Arc::new(ScriptedExecutor::new(Outcome::Success {
            text: "ok".to_string(),
        }));

        // Shutdown is already signalled when the pool starts: the worker
        // must exit without executing, leaving the task in the queue for
        // the still-pending accounting.
        h.shutdown_tx.send(true).unwrap();
        h.dispatcher.enqueue(task("a", 3)).await;

        let pool = WorkerPool::spawn(
            1,
            h.dispatcher.clone(),
            h.coordinator.clone(),
            h.store.clone(),
            executor,
            &h.stats,
            1,
            h.shutdown_rx.clone(),
        );
        let (failures, errors) = pool.join().await;

        assert!(failures.is_empty());
        assert!(errors.is_empty());
        assert_eq!(h.store.len().await, 0);
        assert_eq!(h.dispatcher.len().await, 1);
    }
}
