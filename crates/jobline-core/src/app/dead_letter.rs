//! Dead-letter records for tasks that did not complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DispatchId, DispatchRecord, OutcomeKind};

/// Pushed as JSON onto the dead-letter queue under
/// `FailurePolicy::DeadLetter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub dispatch_id: DispatchId,
    pub event: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    pub detail: String,
    /// Raw payload as popped (lossy UTF-8), so it can be inspected or replayed.
    pub payload: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_record(record: &DispatchRecord, payload: &[u8]) -> Self {
        Self {
            dispatch_id: record.dispatch_id,
            event: record.outcome.kind(),
            function_name: record
                .outcome
                .function_name()
                .map(|n| n.as_str().to_string()),
            detail: record.outcome.detail().unwrap_or_default(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            failed_at: record.at,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
