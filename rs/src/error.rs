//! Store error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur against the result store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persisted store failed to parse. Fatal: the run refuses to
    /// proceed rather than risk silent data loss or duplication.
    #[error("corrupt result store {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// Another process holds the store lock
    #[error("result store {path} is locked by another process")]
    Locked { path: PathBuf },

    /// A result with this key was already appended
    #[error("duplicate result key: {key}")]
    DuplicateKey { key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Check whether this error should abort the run at startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. } | StoreError::Locked { .. })
    }
}
