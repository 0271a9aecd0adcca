//! Endpoint registry and rate-limit coordination
//!
//! All workers read the shared "current endpoint" through a [`Lease`];
//! only the coordinator mutates it, inside one exclusive section. When a
//! worker reports a rate limit, the coordinator advances the registry to
//! the next endpoint (wrapping after the last) and every worker waits on
//! the switch-complete condition before pulling new work - a cooperative
//! pause, not a busy-poll.
//!
//! Duplicate signals are expected: several workers can hit the same
//! exhausted endpoint at once. The lease epoch makes rotation idempotent -
//! a signal carrying a stale epoch arrives after someone else already
//! rotated away from that endpoint, and is ignored.

use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::error::RunError;

/// A worker's read of the registry at the moment it started a task
#[derive(Debug, Clone)]
pub struct Lease {
    /// Position in the configured endpoint list
    pub index: usize,
    /// Rotation generation this lease was taken under
    pub epoch: u64,
    /// Endpoint identifier handed to the executor
    pub endpoint: String,
}

/// Registry state, only ever touched under the coordinator's mutex
struct RegistryInner {
    endpoints: Vec<String>,
    current: usize,
    epoch: u64,
    switching: bool,
    /// Rotations since the last successful completion
    strikes: usize,
}

/// Owns all mutation of the endpoint registry
pub struct RateLimitCoordinator {
    inner: Mutex<RegistryInner>,
    notify: Notify,
    /// Pause between marking a switch and releasing workers, giving the
    /// new endpoint a moment before the herd arrives
    cooldown: Duration,
}

impl RateLimitCoordinator {
    /// Create a coordinator over an ordered, non-empty endpoint list
    pub fn new(endpoints: Vec<String>, cooldown: Duration) -> Result<Self, RunError> {
        if endpoints.is_empty() {
            return Err(RunError::NoEndpoints);
        }
        debug!(count = endpoints.len(), ?cooldown, "RateLimitCoordinator::new");
        Ok(Self {
            inner: Mutex::new(RegistryInner {
                endpoints,
                current: 0,
                epoch: 0,
                switching: false,
                strikes: 0,
            }),
            notify: Notify::new(),
            cooldown,
        })
    }

    /// Read the current endpoint
    pub async fn lease(&self) -> Lease {
        let inner = self.inner.lock().await;
        Lease {
            index: inner.current,
            epoch: inner.epoch,
            endpoint: inner.endpoints[inner.current].clone(),
        }
    }

    /// Suspend while an endpoint switch is in progress
    ///
    /// Workers call this before each dequeue so the whole pool pauses
    /// consistently during a rotation.
    pub async fn wait_ready(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let inner = self.inner.lock().await;
                if !inner.switching {
                    return;
                }
                debug!("Worker waiting for endpoint switch to complete");
            }
            notified.await;
        }
    }

    /// Record a successful completion, resetting exhaustion tracking
    pub async fn note_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.strikes = 0;
    }

    /// Report that the leased endpoint signalled a rate limit
    ///
    /// Returns `Ok(true)` if this signal caused a rotation and `Ok(false)`
    /// if it was a duplicate of one already handled. Fails with
    /// [`RunError::EndpointsExhausted`] once a full rotation happens with
    /// no intervening success.
    pub async fn report_rate_limit(&self, lease: &Lease) -> Result<bool, RunError> {
        let mut inner = self.inner.lock().await;

        if lease.epoch != inner.epoch {
            // Another worker already rotated away from this endpoint
            debug!(
                lease_epoch = lease.epoch,
                current_epoch = inner.epoch,
                "Ignoring duplicate rate-limit signal"
            );
            return Ok(false);
        }

        let total = inner.endpoints.len();
        let from = inner.current;
        inner.strikes += 1;
        inner.current = (inner.current + 1) % total;
        inner.epoch += 1;

        if inner.strikes >= total {
            // Every endpoint rate limited within one rotation: give up
            // rather than spin forever.
            warn!(total, "All endpoints exhausted without an intervening success");
            inner.switching = false;
            drop(inner);
            self.notify.notify_waiters();
            return Err(RunError::EndpointsExhausted(total));
        }

        inner.switching = true;
        let to = inner.current;
        info!(from, to, epoch = inner.epoch, "Rotating to next endpoint");
        drop(inner);

        if !self.cooldown.is_zero() {
            tokio::time::sleep(self.cooldown).await;
        }

        let mut inner = self.inner.lock().await;
        inner.switching = false;
        drop(inner);
        self.notify.notify_waiters();

        Ok(true)
    }

    /// Current endpoint index (for status reporting and tests)
    pub async fn current_index(&self) -> usize {
        self.inner.lock().await.current
    }

    /// Number of configured endpoints
    pub async fn endpoint_count(&self) -> usize {
        self.inner.lock().await.endpoints.len()
    }
}
