//! End-to-end run orchestration
//!
//! Wires loader, dispatcher, coordinator, worker pool, and result store
//! together for one batch run. The run always ends with an accounting of
//! succeeded / permanently failed / still-pending tasks, whether it
//! finished or aborted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use resultstore::ResultStore;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::RunError;
use crate::executor::Executor;
use crate::loader;
use crate::pool::{PermanentFailure, WorkerPool};
use crate::rotation::RateLimitCoordinator;
use crate::stats::{StatsCollector, StatsSnapshot};

/// Final accounting for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id for this run (appears in logs)
    pub run_id: String,
    /// Size of the input batch
    pub batch_total: usize,
    /// Tasks skipped at load because their keys were already persisted
    pub already_persisted: usize,
    /// Tasks completed and persisted during this run
    pub succeeded: usize,
    /// Tasks that spent their retry budget, with reasons
    pub permanently_failed: Vec<PermanentFailure>,
    /// Tasks left unprocessed (non-zero only when the run aborted)
    pub still_pending: usize,
    /// Why the run aborted, if it did
    pub aborted: Option<String>,
    /// Aggregated worker statistics
    pub stats: StatsSnapshot,
}

/// Orchestrates one batch run end to end
pub struct BatchRunner {
    config: Config,
    executor: Arc<dyn Executor>,
}

impl BatchRunner {
    pub fn new(config: Config, executor: Arc<dyn Executor>) -> Self {
        Self { config, executor }
    }

    /// Run the batch at `batch_path` to completion (or abort)
    ///
    /// `shutdown` cooperatively stops the pool: workers finish their
    /// in-flight executor call and exit; leftover tasks are counted as
    /// still-pending.
    pub async fn run(&self, batch_path: &Path, shutdown: watch::Receiver<bool>) -> Result<RunReport, RunError> {
        let run_id = Uuid::now_v7().to_string();
        info!(%run_id, batch = %batch_path.display(), "Run starting");

        // Fail fast: a corrupt or locked store aborts before any work
        let store = Arc::new(ResultStore::open(&self.config.output)?);

        // Fail fast: malformed input aborts before any work
        let batch = loader::load_batch(batch_path).await?;
        let batch_total = batch.len();

        let done = store.keys().await;
        let tasks = loader::resume(batch, &done, self.config.max_retries);
        let already_persisted = batch_total - tasks.len();

        if tasks.is_empty() {
            info!(%run_id, already_persisted, "Nothing to do, all batch keys already persisted");
            store.export().await?;
            return Ok(RunReport {
                run_id,
                batch_total,
                already_persisted,
                succeeded: 0,
                permanently_failed: Vec::new(),
                still_pending: 0,
                aborted: None,
                stats: StatsCollector::new(0).snapshot(),
            });
        }

        let coordinator = Arc::new(RateLimitCoordinator::new(
            self.config.endpoints.clone(),
            Duration::from_millis(self.config.switch_cooldown_ms),
        )?);

        let dispatcher = Arc::new(Dispatcher::new());
        let pending_count = tasks.len();
        for task in tasks {
            dispatcher.enqueue(task).await;
        }

        let stats = StatsCollector::new(self.config.workers);
        let pool = WorkerPool::spawn(
            self.config.workers,
            dispatcher.clone(),
            coordinator.clone(),
            store.clone(),
            self.executor.clone(),
            &stats,
            pending_count,
            shutdown.clone(),
        );

        let (permanently_failed, errors) = pool.join().await;

        let aborted = if let Some(e) = errors.first() {
            Some(e.to_string())
        } else if *shutdown.borrow() {
            Some("interrupted".to_string())
        } else {
            None
        };

        let still_pending = dispatcher.drain().await.len();
        if let Some(reason) = &aborted {
            warn!(%run_id, reason, still_pending, "Run aborted");
        }

        // Bring the array view up to date with everything that committed
        store.export().await?;

        let snapshot = stats.snapshot();
        info!(
            %run_id,
            succeeded = snapshot.succeeded,
            failed = permanently_failed.len(),
            still_pending,
            "Run finished"
        );

        Ok(RunReport {
            run_id,
            batch_total,
            already_persisted,
            succeeded: snapshot.succeeded as usize,
            permanently_failed,
            still_pending,
            aborted,
            stats: snapshot,
        })
    }
}
