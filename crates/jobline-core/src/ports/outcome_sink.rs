//! OutcomeSink port - where dispatch outcomes are reported.

use crate::domain::DispatchRecord;

/// Receives one record per dispatch iteration.
///
/// Called inline on the worker, so implementations should not block.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, record: &DispatchRecord);
}
