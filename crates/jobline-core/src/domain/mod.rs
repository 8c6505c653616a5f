//! Domain model: task descriptors, outcomes, identifiers and errors.

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod task;

pub use self::errors::{DecodeError, DecodeReason, DispatchError, HandlerError, QueueError};
pub use self::ids::DispatchId;
pub use self::outcome::{
    DispatchOutcome, DispatchRecord, OutcomeKind, preview_payload, summarize_arguments,
};
pub use self::task::{FunctionName, InvalidFunctionName, TaskDescriptor};
