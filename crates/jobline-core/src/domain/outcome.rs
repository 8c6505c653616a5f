//! Dispatch outcomes: the result of one loop iteration.
//!
//! Outcomes are never persisted. They feed the `OutcomeSink` (logs) and the
//! failure policy (dead-letter), and are returned from `dispatch_one` so
//! callers and tests can inspect what happened.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{DecodeError, HandlerError};
use super::ids::DispatchId;
use super::task::FunctionName;

/// Longest argument summary written to logs.
const ARGS_SUMMARY_LIMIT: usize = 256;

/// Longest raw payload excerpt kept on a decode failure.
const PAYLOAD_PREVIEW_LIMIT: usize = 256;

/// Event name of an outcome, as it appears in structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    DecodeFailure,
    HandlerNotFound,
    HandlerFailure,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::DecodeFailure => "decode_failure",
            OutcomeKind::HandlerNotFound => "handler_not_found",
            OutcomeKind::HandlerFailure => "handler_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success {
        function_name: FunctionName,
        value: serde_json::Value,
        duration: Duration,
    },
    DecodeFailure {
        error: DecodeError,
        /// Lossy UTF-8 excerpt of the raw payload.
        payload_preview: String,
    },
    HandlerNotFound {
        function_name: FunctionName,
    },
    HandlerFailure {
        function_name: FunctionName,
        arguments: String,
        error: HandlerError,
        duration: Duration,
    },
}

impl DispatchOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            DispatchOutcome::Success { .. } => OutcomeKind::Success,
            DispatchOutcome::DecodeFailure { .. } => OutcomeKind::DecodeFailure,
            DispatchOutcome::HandlerNotFound { .. } => OutcomeKind::HandlerNotFound,
            DispatchOutcome::HandlerFailure { .. } => OutcomeKind::HandlerFailure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success { .. })
    }

    pub fn function_name(&self) -> Option<&FunctionName> {
        match self {
            DispatchOutcome::Success { function_name, .. }
            | DispatchOutcome::HandlerNotFound { function_name }
            | DispatchOutcome::HandlerFailure { function_name, .. } => Some(function_name),
            DispatchOutcome::DecodeFailure { .. } => None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            DispatchOutcome::Success { duration, .. }
            | DispatchOutcome::HandlerFailure { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    /// Human-readable failure detail; `None` for successes.
    pub fn detail(&self) -> Option<String> {
        match self {
            DispatchOutcome::Success { .. } => None,
            DispatchOutcome::DecodeFailure { error, .. } => Some(error.to_string()),
            DispatchOutcome::HandlerNotFound { function_name } => {
                Some(format!("no handler registered for `{function_name}`"))
            }
            DispatchOutcome::HandlerFailure { error, .. } => Some(error.to_string()),
        }
    }
}

/// One outcome plus the context needed to attribute it.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub dispatch_id: DispatchId,
    pub worker_id: usize,
    pub at: DateTime<Utc>,
    pub outcome: DispatchOutcome,
}

impl DispatchRecord {
    pub fn new(dispatch_id: DispatchId, worker_id: usize, outcome: DispatchOutcome) -> Self {
        Self {
            dispatch_id,
            worker_id,
            at: Utc::now(),
            outcome,
        }
    }

    /// Structured event shape:
    /// `{event, function_name?, duration_ms?, detail?, value?, dispatch_id, worker_id, at}`.
    pub fn to_event(&self) -> serde_json::Value {
        let mut event = serde_json::json!({
            "event": self.outcome.kind(),
            "dispatch_id": self.dispatch_id,
            "worker_id": self.worker_id,
            "at": self.at,
        });
        if let Some(name) = self.outcome.function_name() {
            event["function_name"] = serde_json::Value::from(name.as_str());
        }
        if let Some(duration) = self.outcome.duration() {
            event["duration_ms"] = serde_json::Value::from(duration.as_millis() as u64);
        }
        if let Some(detail) = self.outcome.detail() {
            event["detail"] = serde_json::Value::from(detail);
        }
        if let DispatchOutcome::Success { value, .. } = &self.outcome {
            event["value"] = value.clone();
        }
        event
    }
}

/// Compact rendering of positional arguments for failure logs.
pub fn summarize_arguments(arguments: &[serde_json::Value]) -> String {
    let rendered = serde_json::Value::Array(arguments.to_vec()).to_string();
    truncate(rendered, ARGS_SUMMARY_LIMIT)
}

/// Printable excerpt of a raw payload for decode-failure logs.
pub fn preview_payload(payload: &[u8]) -> String {
    truncate(String::from_utf8_lossy(payload).into_owned(), PAYLOAD_PREVIEW_LIMIT)
}

fn truncate(s: String, limit: usize) -> String {
    if s.len() <= limit {
        return s;
    }
    let mut cut = limit;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}… ({} bytes)", &s[..cut], s.len())
}
