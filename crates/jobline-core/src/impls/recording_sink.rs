//! RecordingSink - keeps every dispatch record in memory.
//!
//! Meant for tests and embedding code that wants to inspect outcomes.

use std::sync::Mutex;

use crate::domain::{DispatchRecord, OutcomeKind};
use crate::ports::OutcomeSink;

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<DispatchRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn kinds(&self) -> Vec<OutcomeKind> {
        self.records().iter().map(|r| r.outcome.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutcomeSink for RecordingSink {
    fn record(&self, record: &DispatchRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
    }
}
