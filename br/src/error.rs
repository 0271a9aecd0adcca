//! Run-level error taxonomy

use thiserror::Error;

/// Errors that abort a run (or part of one)
///
/// Transient task failures and rate limits are handled inside the worker
/// pool and never surface as a `RunError`; everything here either stops the
/// run before work starts or aborts it mid-flight.
#[derive(Debug, Error)]
pub enum RunError {
    /// Input batch is invalid (missing, empty, or duplicate ids). Fatal at
    /// load, before any work starts.
    #[error("malformed input batch: {0}")]
    MalformedInput(String),

    /// Every endpoint was rate limited within one full rotation with no
    /// intervening success
    #[error("all {0} endpoints exhausted with no intervening success")]
    EndpointsExhausted(usize),

    /// No endpoints were configured
    #[error("no endpoints configured")]
    NoEndpoints,

    /// The result store refused to open or accept a write
    #[error(transparent)]
    Store(#[from] resultstore::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
