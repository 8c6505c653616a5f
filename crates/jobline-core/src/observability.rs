//! Logging set-up, the tracing-backed outcome sink and dispatch counters.
//!
//! ## Environment variables
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG, TRACE (default INFO)
//! - `LOG_FORMAT`: json, pretty, compact (default json)
//! - `RUST_LOG`: overrides filtering entirely

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::domain::{DispatchOutcome, DispatchRecord, OutcomeKind};
use crate::ports::OutcomeSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Unknown values fall back to JSON.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

pub fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init_logging(level: Level, format: LogFormat) {
    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(level.to_string()),
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => subscriber.with(fmt::layer().json()).init(),
        LogFormat::Pretty => subscriber.with(fmt::layer().pretty()).init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_target(false))
            .init(),
    }
}

/// `init_logging` driven by `LOG_LEVEL` / `LOG_FORMAT`.
pub fn init_default_logging() {
    let level = parse_level(&env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()));
    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()));
    init_logging(level, format);
}

/// Writes each outcome as a structured `tracing` event.
///
/// success → info, decode_failure / handler_not_found → warn,
/// handler_failure → error.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn record(&self, record: &DispatchRecord) {
        let dispatch_id = record.dispatch_id.to_string();
        let worker_id = record.worker_id;
        let event = record.outcome.kind().as_str();

        match &record.outcome {
            DispatchOutcome::Success {
                function_name,
                duration,
                ..
            } => info!(
                event,
                %dispatch_id,
                worker_id,
                function_name = function_name.as_str(),
                duration_ms = duration.as_millis() as u64,
                "task completed"
            ),
            DispatchOutcome::DecodeFailure {
                error,
                payload_preview,
            } => warn!(
                event,
                %dispatch_id,
                worker_id,
                reason = error.reason.as_str(),
                payload = payload_preview.as_str(),
                detail = %error,
                "dropping undecodable payload"
            ),
            DispatchOutcome::HandlerNotFound { function_name } => warn!(
                event,
                %dispatch_id,
                worker_id,
                function_name = function_name.as_str(),
                "no handler registered, dropping task"
            ),
            DispatchOutcome::HandlerFailure {
                function_name,
                arguments,
                error,
                duration,
            } => error!(
                event,
                %dispatch_id,
                worker_id,
                function_name = function_name.as_str(),
                arguments = arguments.as_str(),
                duration_ms = duration.as_millis() as u64,
                detail = %error,
                "task failed"
            ),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub succeeded: u64,
    pub decode_failures: u64,
    pub handlers_not_found: u64,
    pub handler_failures: u64,
    pub idle_polls: u64,
    pub queue_errors: u64,
}

impl DispatchCounts {
    pub fn dispatched(&self) -> u64 {
        self.succeeded + self.decode_failures + self.handlers_not_found + self.handler_failures
    }
}

/// Lock-free counters shared by all workers of a dispatcher.
#[derive(Debug, Default)]
pub struct DispatchStats {
    succeeded: AtomicU64,
    decode_failures: AtomicU64,
    handlers_not_found: AtomicU64,
    handler_failures: AtomicU64,
    idle_polls: AtomicU64,
    queue_errors: AtomicU64,
}

impl DispatchStats {
    pub fn record_outcome(&self, kind: OutcomeKind) {
        let counter = match kind {
            OutcomeKind::Success => &self.succeeded,
            OutcomeKind::DecodeFailure => &self.decode_failures,
            OutcomeKind::HandlerNotFound => &self.handlers_not_found,
            OutcomeKind::HandlerFailure => &self.handler_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_poll(&self) {
        self.idle_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_error(&self) {
        self.queue_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            handlers_not_found: self.handlers_not_found.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing_defaults_to_json() {
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("nonsense"), LogFormat::Json);
    }

    #[test]
    fn level_parsing_defaults_to_info() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn stats_count_each_outcome_kind() {
        let stats = DispatchStats::default();
        stats.record_outcome(OutcomeKind::Success);
        stats.record_outcome(OutcomeKind::Success);
        stats.record_outcome(OutcomeKind::HandlerNotFound);
        stats.record_idle_poll();

        let counts = stats.snapshot();
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.handlers_not_found, 1);
        assert_eq!(counts.idle_polls, 1);
        assert_eq!(counts.dispatched(), 3);
    }
}
