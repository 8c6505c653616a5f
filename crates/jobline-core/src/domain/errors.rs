//! Error taxonomy for the dispatcher.
//!
//! Per-task errors (`DecodeError`, a missing handler, `HandlerError`) are
//! recovered inside the loop and only ever become a `DispatchOutcome`.
//! `QueueError` is the one category that can end a worker, and only after the
//! retry budget is spent (`DispatchError::Infrastructure`).

use thiserror::Error;

/// Why a payload could not be turned into a `TaskDescriptor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeReason {
    /// Not parseable, or parseable but not the expected shape.
    Syntax,
    /// `func` absent, null or empty.
    MissingField,
}

impl DecodeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecodeReason::Syntax => "syntax",
            DecodeReason::MissingField => "missing_field",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode failed ({}): {message}", reason.as_str())]
pub struct DecodeError {
    pub reason: DecodeReason,
    pub message: String,
}

impl DecodeError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self {
            reason: DecodeReason::Syntax,
            message: message.into(),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self {
            reason: DecodeReason::MissingField,
            message: format!("missing or empty field `{field}`"),
        }
    }
}

/// Failure raised while running a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The positional arguments could not be bound to the handler's inputs
    /// (wrong arity or wrong types).
    #[error("argument binding failed: {0}")]
    Arguments(String),

    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler observed the cancel signal and gave up.
    #[error("handler cancelled")]
    Cancelled,
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Errors reported by a `TaskQueue` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue connection failed: {0}")]
    Connection(String),

    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            QueueError::Connection(err.to_string())
        } else {
            QueueError::OperationFailed(err.to_string())
        }
    }
}

/// Fatal errors that stop a worker (and therefore the pool).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker-{worker_id}: queue unusable after {attempts} consecutive failures: {source}")]
    Infrastructure {
        worker_id: usize,
        attempts: u32,
        #[source]
        source: QueueError,
    },

    /// A worker task ended abnormally (panicked outside any handler).
    #[error("worker aborted: {detail}")]
    WorkerAborted { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_message_names_the_reason() {
        let err = DecodeError::missing_field("func");
        assert_eq!(err.reason, DecodeReason::MissingField);
        assert_eq!(
            err.to_string(),
            "decode failed (missing_field): missing or empty field `func`"
        );
    }

    #[test]
    fn infrastructure_error_keeps_the_queue_error_as_source() {
        let err = DispatchError::Infrastructure {
            worker_id: 2,
            attempts: 5,
            source: QueueError::Connection("refused".into()),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "queue connection failed: refused");
        assert!(err.to_string().starts_with("worker-2: queue unusable after 5"));
    }
}
