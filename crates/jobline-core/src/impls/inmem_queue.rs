//! InMemoryTaskQueue - process-local queue for development and tests.
//!
//! One FIFO per queue name behind a single mutex. Poppers wait on a `Notify`
//! that every push wakes; the `Notified` future is enabled before the queue is
//! checked, so a push landing between the check and the wait is not missed.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::QueueError;
use crate::ports::{RawPayload, TaskQueue};

#[derive(Default)]
pub struct InMemoryTaskQueue {
    queues: Mutex<HashMap<String, VecDeque<RawPayload>>>,
    notify: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads waiting on `queue`.
    pub async fn len(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }

    /// Copy of everything waiting on `queue`, head first.
    pub async fn snapshot(&self, queue: &str) -> Vec<RawPayload> {
        let queues = self.queues.lock().await;
        queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn try_pop(&self, queue: &str) -> Option<RawPayload> {
        let mut queues = self.queues.lock().await;
        queues.get_mut(queue).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn push(&self, queue: &str, payload: RawPayload) -> Result<(), QueueError> {
        {
            let mut queues = self.queues.lock().await;
            queues.entry(queue.to_string()).or_default().push_back(payload);
        }
        // Waiters may be parked on other queue names; wake all and let them recheck.
        self.notify.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<RawPayload>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.try_pop(queue).await {
                return Ok(Some(payload));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    // The payload leaves the map and is returned with no await in between.
    fn pop_is_cancel_safe(&self) -> bool {
        true
    }
}
