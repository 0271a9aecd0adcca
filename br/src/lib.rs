//! BatchRun - concurrent batch dispatcher with endpoint rotation
//!
//! BatchRun distributes a batch of independent tasks across a bounded pool
//! of async workers, each driving an external executor that may be slow,
//! flaky, or rate limited. Completed results are persisted incrementally
//! and crash-safely, so an interrupted run resumes where it left off.
//!
//! # Core Concepts
//!
//! - **Resume From The Store**: pending work is the batch minus the keys
//!   already persisted; running the same batch twice never duplicates work
//! - **Rate Limits Are Not Failures**: a rate-limited task keeps its retry
//!   budget, goes to the back of the queue, and triggers one shared
//!   endpoint rotation for all workers
//! - **Bounded Retries**: transient failures retry up to a configured
//!   ceiling, then the task is permanently failed and reported
//! - **Every Result Survives**: each completed result is fsynced before
//!   the task is considered done
//!
//! # Modules
//!
//! - [`domain`] - task and status value types
//! - [`loader`] - batch parsing and resume set computation
//! - [`dispatcher`] - concurrency-safe FIFO task queue
//! - [`rotation`] - endpoint registry and rate-limit coordinator
//! - [`executor`] - executor seam and the HTTP implementation
//! - [`pool`] - the worker pool
//! - [`stats`] - per-worker counters and aggregation
//! - [`runner`] - end-to-end run orchestration
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod executor;
pub mod loader;
pub mod pool;
pub mod rotation;
pub mod runner;
pub mod stats;

// Re-export commonly used types
pub use config::{Config, ExecutorConfig};
pub use dispatcher::Dispatcher;
pub use domain::{BatchEntry, Task, TaskStatus};
pub use error::RunError;
pub use executor::{Executor, HttpExecutor, Outcome};
pub use pool::{PermanentFailure, WorkerPool};
pub use rotation::{Lease, RateLimitCoordinator};
pub use runner::{BatchRunner, RunReport};
pub use stats::{StatsCollector, StatsSnapshot, WorkerStats};
