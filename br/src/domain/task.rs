//! Task domain type
//!
//! A task is a plain value struct; all status and retry transitions happen
//! in the worker that currently owns it, never through shared mutation.

use serde::{Deserialize, Serialize};

/// One record of the input batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchEntry {
    /// Unique identifier within the batch
    pub id: String,
    /// Opaque work payload (e.g. a prompt)
    pub payload: String,
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue
    #[default]
    Pending,
    /// Owned by a worker, executor call in flight
    InFlight,
    /// Result persisted
    Completed,
    /// Bounced off an exhausted endpoint; requeued without retry cost
    RateLimited,
    /// Retry budget spent; never retried again
    PermanentlyFailed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Completed => write!(f, "completed"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::PermanentlyFailed => write!(f, "permanently_failed"),
        }
    }
}

/// One unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (from the batch)
    pub id: String,

    /// Opaque payload handed to the executor
    pub payload: String,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Failures so far; rate limits never increment this
    pub retry_count: u32,

    /// Configured retry ceiling
    pub max_retries: u32,
}

impl Task {
    /// Create a pending task from a batch entry
    pub fn new(entry: BatchEntry, max_retries: u32) -> Self {
        Self {
            id: entry.id,
            payload: entry.payload,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries,
        }
    }

    /// Whether another retry fits in the budget
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Count one failed attempt against the budget
    pub fn record_failure(&mut self) {
        self.retry_count += 1;
    }

    /// Transition to a new status
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> BatchEntry {
        BatchEntry {
            id: id.to_string(),
            payload: "payload".to_string(),
        }
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new(entry("a"), 3);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert!(task.can_retry());
    }

    #[test]
    fn test_retry_budget() {
        let mut task = Task::new(entry("a"), 2);

        task.record_failure();
        assert!(task.can_retry());
        task.record_failure();
        assert!(!task.can_retry());
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let mut task = Task::new(entry("a"), 0);
        assert!(!task.can_retry());
        task.record_failure();
        assert!(!task.can_retry());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::PermanentlyFailed.to_string(), "permanently_failed");
    }
}
