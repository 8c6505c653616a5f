//! TaskQueue port - the shared blocking FIFO the dispatcher consumes.
//!
//! Implementations must make `blocking_pop` atomic: a payload handed to one
//! caller is never handed to a concurrent caller on the same queue.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::QueueError;

/// Serialized task descriptor as it sits on the queue.
pub type RawPayload = Vec<u8>;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a payload to the tail of `queue`.
    async fn push(&self, queue: &str, payload: RawPayload) -> Result<(), QueueError>;

    /// Take the head of `queue`, waiting up to `timeout`.
    ///
    /// `Ok(None)` means the timeout elapsed with nothing to take; it is not an
    /// error.
    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<RawPayload>, QueueError>;

    /// Whether a `blocking_pop` future may be dropped mid-wait without losing
    /// a payload. Workers only race the pop against shutdown when it is;
    /// otherwise shutdown is observed when the pop returns.
    fn pop_is_cancel_safe(&self) -> bool {
        false
    }
}
