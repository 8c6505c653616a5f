//! Ports - seams to the outside world.
//!
//! - `TaskQueue`: blocking queue client (in-memory, Redis)
//! - `OutcomeSink`: observability sink for dispatch outcomes

pub mod outcome_sink;
pub mod task_queue;

pub use self::outcome_sink::OutcomeSink;
pub use self::task_queue::{RawPayload, TaskQueue};
