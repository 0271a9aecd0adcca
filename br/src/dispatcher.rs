//! Concurrency-safe FIFO task queue
//!
//! Workers suspend on [`Dispatcher::dequeue`] until a task arrives or the
//! queue is closed. Re-enqueued (retried or rate-limited) tasks go to the
//! back, preserving fairness across tasks.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::domain::Task;

struct DispatchInner {
    queue: VecDeque<Task>,
    closed: bool,
}

/// The task queue shared by producer (loader) and consumers (workers)
pub struct Dispatcher {
    inner: Mutex<DispatchInner>,
    notify: Notify,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DispatchInner {
                queue: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Push a task onto the back of the queue
    ///
    /// Never drops: tasks enqueued after [`close`](Self::close) are kept so
    /// they show up in the still-pending accounting, even though no worker
    /// will dequeue them.
    pub async fn enqueue(&self, task: Task) {
        let mut inner = self.inner.lock().await;
        debug!(task_id = %task.id, depth = inner.queue.len(), "Enqueue");
        inner.queue.push_back(task);
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Take the next task, suspending until one is available
    ///
    /// Returns `None` once the queue has been closed (end-of-stream); a
    /// closed queue stops serving immediately, even if tasks remain.
    pub async fn dequeue(&self) -> Option<Task> {
        loop {
            // Register for notification before checking state, so a
            // notify between the check and the await is not lost.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    return None;
                }
                if let Some(task) = inner.queue.pop_front() {
                    debug!(task_id = %task.id, remaining = inner.queue.len(), "Dequeue");
                    return Some(task);
                }
            }
            notified.await;
        }
    }

    /// Signal end-of-stream: outstanding and future `dequeue` calls return
    /// `None` instead of blocking forever
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        debug!(leftover = inner.queue.len(), "Dispatcher closed");
        drop(inner);
        self.notify.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drain whatever is left (for still-pending reporting after an abort)
    pub async fn drain(&self) -> Vec<Task> {
        let mut inner = self.inner.lock().await;
        inner.queue.drain(..).collect()
    }
}
