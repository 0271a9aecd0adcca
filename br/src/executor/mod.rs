//! Executor seam
//!
//! The sole boundary between the orchestration core and whatever actually
//! performs the work. The core knows nothing about how execution happens;
//! it hands over a task and an endpoint and interprets the three-way
//! outcome.

mod http;

use async_trait::async_trait;

use crate::domain::Task;

pub use http::HttpExecutor;

/// Result of one execution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The work completed; `text` is the opaque output
    Success { text: String },
    /// The endpoint signalled it is exhausted. Not an error against the
    /// task: never consumes retry budget, always triggers rotation.
    RateLimited,
    /// The attempt failed; retried up to the task's budget
    Failure { reason: String },
}

/// The external execution capability
#[async_trait]
pub trait Executor: Send + Sync {
    /// Perform one task against one endpoint
    ///
    /// Treated as atomic by the core: never cancelled mid-call.
    async fn execute(&self, task: &Task, endpoint: &str) -> Outcome;
}
