//! Impls - port implementations.
//!
//! - **InMemoryTaskQueue**: process-local queue (development, tests)
//! - **RedisTaskQueue**: Redis list backend (`redis` feature)
//! - **RecordingSink**: in-memory outcome sink

pub mod inmem_queue;
pub mod recording_sink;
#[cfg(feature = "redis")]
pub mod redis_queue;

pub use self::inmem_queue::InMemoryTaskQueue;
pub use self::recording_sink::RecordingSink;
#[cfg(feature = "redis")]
pub use self::redis_queue::RedisTaskQueue;
