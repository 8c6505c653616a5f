//! Dispatcher configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! queue_name = "queue"
//! pop_timeout_ms = 5000
//! workers = 4
//! max_queue_retries = 5
//! retry_base_delay_ms = 200
//! retry_max_delay_ms = 10000
//!
//! [failure_policy]
//! mode = "dead_letter"
//! queue = "queue:dead"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What happens to a task that did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log and forget.
    #[default]
    Drop,
    /// Log, then push a dead-letter record onto `queue`.
    DeadLetter { queue: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Queue the workers pop from.
    pub queue_name: String,
    /// Upper bound on one blocking pop; also how often an idle worker wakes.
    pub pop_timeout_ms: u64,
    /// Worker pool size: the maximum number of handlers running at once.
    pub workers: usize,
    /// Consecutive queue errors a worker tolerates before giving up.
    pub max_queue_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_name: "queue".to_string(),
            pop_timeout_ms: 5_000,
            workers: 4,
            max_queue_retries: 5,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 10_000,
            failure_policy: FailurePolicy::Drop,
        }
    }
}

impl DispatcherConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_name.is_empty() {
            return Err(ConfigError::Invalid("queue_name must not be empty".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.pop_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "pop_timeout_ms must be positive (0 would block forever on some queues)".into(),
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry_max_delay_ms must be >= retry_base_delay_ms".into(),
            ));
        }
        if let FailurePolicy::DeadLetter { queue } = &self.failure_policy {
            if queue.is_empty() {
                return Err(ConfigError::Invalid("dead-letter queue name is empty".into()));
            }
            if *queue == self.queue_name {
                return Err(ConfigError::Invalid(
                    "dead-letter queue must differ from the task queue".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: 2.0,
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_attempts: self.max_queue_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = DispatcherConfig::from_toml_str("").unwrap();
        assert_eq!(config, DispatcherConfig::default());
        assert_eq!(config.queue_name, "queue");
        assert_eq!(config.pop_timeout(), Duration::from_secs(5));
        assert_eq!(config.failure_policy, FailurePolicy::Drop);
    }

    #[test]
    fn parses_dead_letter_policy() {
        let config = DispatcherConfig::from_toml_str(
            r#"
            queue_name = "jobs"
            workers = 8

            [failure_policy]
            mode = "dead_letter"
            queue = "jobs:dead"
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(
            config.failure_policy,
            FailurePolicy::DeadLetter {
                queue: "jobs:dead".into()
            }
        );
    }

    #[test]
    fn rejects_zero_workers() {
        let err = DispatcherConfig::from_toml_str("workers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("workers")));
    }

    #[test]
    fn rejects_zero_pop_timeout() {
        let err = DispatcherConfig::from_toml_str("pop_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_dead_letter_onto_the_task_queue() {
        let config = DispatcherConfig {
            failure_policy: FailurePolicy::DeadLetter {
                queue: "queue".into(),
            },
            ..DispatcherConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_policy_mode() {
        let err = DispatcherConfig::from_toml_str(
            r#"
            [failure_policy]
            mode = "requeue"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn retry_policy_follows_config() {
        let config = DispatcherConfig {
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 1_000,
            max_queue_retries: 3,
            ..DispatcherConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 3);
    }
}
