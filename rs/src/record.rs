//! Result record type
//!
//! One record per completed task. Immutable once created; appended exactly
//! once per key.

use serde::{Deserialize, Serialize};

/// A single completed result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    /// Task id this result belongs to
    pub key: String,

    /// Output text produced by the executor
    pub value: String,

    /// RFC3339 completion timestamp
    pub timestamp: String,

    /// Worker that produced the result
    pub worker_id: usize,

    /// Endpoint that produced the result
    pub endpoint_id: String,
}

impl ResultRecord {
    /// Create a record stamped with the current time
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        worker_id: usize,
        endpoint_id: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            worker_id,
            endpoint_id: endpoint_id.into(),
        }
    }
}
