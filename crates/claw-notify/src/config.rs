//! Notifier configuration.
//!
//! The configuration is plain JSON. Top-level keys use snake case
//! (`max_length`), while the batching section keeps its camel-case keys
//! (`errorBatching.maxSize`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};

/// Default interval between periodic flushes, in milliseconds.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 60_000;
/// Default entry count that triggers an eager flush.
pub const DEFAULT_MAX_SIZE: usize = 50;
/// Default character cap for one batched report.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;
/// Default character cap applied by the notifier at dispatch time.
pub const DEFAULT_MAX_LENGTH: usize = 4000;
/// Smallest store capacity derived from `maxSize`.
const MIN_STORE_CAPACITY: usize = 100;

/// Top-level notifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Master switch for all dispatch.
    pub enable: bool,
    /// Identifier of the downstream notification worker.
    pub worker: String,
    /// Per-message character cap applied at dispatch time.
    pub max_length: usize,
    /// Default channel when none is supplied per call.
    pub channel: String,
    /// Optional environment label prefixed to every message.
    pub env: Option<String>,
    /// Batching settings. Batching is off when absent.
    #[serde(rename = "errorBatching", skip_serializing_if = "Option::is_none")]
    pub error_batching: Option<BatchingConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enable: true,
            worker: "chat-notify".to_string(),
            max_length: DEFAULT_MAX_LENGTH,
            channel: "errors".to_string(),
            env: None,
            error_batching: None,
        }
    }
}

impl NotifyConfig {
    /// Parses a configuration from a JSON string and validates it.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` if the JSON is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| NotifyError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::ConfigIo` if the file cannot be read, or
    /// `NotifyError::InvalidConfig` if its contents are invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Enables batching with the given settings.
    #[must_use]
    pub fn with_batching(mut self, batching: BatchingConfig) -> Self {
        self.error_batching = Some(batching);
        self
    }

    /// Sets the environment label.
    #[must_use]
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    /// Sets the default channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sets the dispatch-time length cap.
    #[must_use]
    pub const fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Sets the master switch.
    #[must_use]
    pub const fn enabled(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.worker.trim().is_empty() {
            return Err(invalid("worker cannot be empty"));
        }
        if self.max_length == 0 {
            return Err(invalid("max_length must be greater than zero"));
        }
        if let Some(batching) = &self.error_batching {
            batching.validate()?;
        }
        Ok(())
    }
}

/// Settings for the batching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchingConfig {
    /// Milliseconds between periodic flushes.
    pub interval: u64,
    /// Entry count that triggers an eager flush.
    pub max_size: usize,
    /// Per-report character cap applied by the formatter.
    pub max_message_length: usize,
    /// Capacity of a store built with [`crate::BatchStore::from_config`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_capacity: Option<usize>,
    /// Optional age limit for stored entries, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_ms: Option<u64>,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_FLUSH_INTERVAL_MS,
            max_size: DEFAULT_MAX_SIZE,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            store_capacity: None,
            max_age_ms: None,
        }
    }
}

impl BatchingConfig {
    /// Returns the flush interval as a duration.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    /// Returns the entry age limit, if any.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_ms.map(Duration::from_millis)
    }

    /// Returns the store capacity, derived from `max_size` when unset.
    #[must_use]
    pub fn effective_store_capacity(&self) -> usize {
        self.store_capacity
            .unwrap_or_else(|| (self.max_size * 2).max(MIN_STORE_CAPACITY))
    }

    /// Sets the flush interval in milliseconds.
    #[must_use]
    pub const fn with_interval_ms(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the eager-flush threshold.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the per-report character cap.
    #[must_use]
    pub const fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    /// Validates the batching settings.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` if any value is zero, if
    /// `storeCapacity` is below `maxSize`, or if `maxAgeMs` is shorter than
    /// the flush interval.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(invalid("errorBatching.interval must be greater than zero"));
        }
        if self.max_size == 0 {
            return Err(invalid("errorBatching.maxSize must be greater than zero"));
        }
        if self.max_message_length == 0 {
            return Err(invalid(
                "errorBatching.maxMessageLength must be greater than zero",
            ));
        }
        if self.store_capacity.is_some_and(|cap| cap < self.max_size) {
            return Err(invalid(
                "errorBatching.storeCapacity must be at least errorBatching.maxSize",
            ));
        }
        if let Some(age) = self.max_age_ms {
            // Entries must survive until the next periodic flush.
            if age < self.interval {
                return Err(invalid(
                    "errorBatching.maxAgeMs must be at least errorBatching.interval",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> NotifyError {
    NotifyError::InvalidConfig {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = NotifyConfig::default();
        assert!(config.enable);
        assert_eq!(config.max_length, 4000);
        assert_eq!(config.channel, "errors");
        assert!(config.env.is_none());
        assert!(config.error_batching.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_batching_config() {
        let batching = BatchingConfig::default();
        assert_eq!(batching.interval, 60_000);
        assert_eq!(batching.max_size, 50);
        assert_eq!(batching.max_message_length, 4000);
        assert_eq!(batching.flush_interval(), Duration::from_secs(60));
        assert_eq!(batching.effective_store_capacity(), 100);
        assert!(batching.max_age().is_none());
    }

    #[test]
    fn parse_full_json() {
        let json = r#"{
            "enable": true,
            "worker": "slack-worker",
            "max_length": 3000,
            "channel": "alerts",
            "env": "staging",
            "errorBatching": {
                "interval": 30000,
                "maxSize": 20,
                "maxMessageLength": 1500,
                "maxAgeMs": 120000
            }
        }"#;

        let config = NotifyConfig::from_json_str(json).unwrap();
        assert_eq!(config.worker, "slack-worker");
        assert_eq!(config.max_length, 3000);
        assert_eq!(config.channel, "alerts");
        assert_eq!(config.env.as_deref(), Some("staging"));

        let batching = config.error_batching.unwrap();
        assert_eq!(batching.interval, 30_000);
        assert_eq!(batching.max_size, 20);
        assert_eq!(batching.max_message_length, 1500);
        assert_eq!(batching.max_age(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn parse_partial_json_uses_defaults() {
        let config = NotifyConfig::from_json_str(r#"{"errorBatching": {}}"#).unwrap();
        assert_eq!(config.worker, "chat-notify");
        assert_eq!(config.error_batching, Some(BatchingConfig::default()));
    }

    #[test]
    fn parse_malformed_json_fails() {
        let result = NotifyConfig::from_json_str("{not json");
        assert!(matches!(result, Err(NotifyError::InvalidConfig { .. })));
    }

    #[test]
    fn empty_worker_rejected() {
        let result = NotifyConfig::from_json_str(r#"{"worker": "  "}"#);
        match result {
            Err(NotifyError::InvalidConfig { reason }) => assert!(reason.contains("worker")),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn zero_max_size_rejected() {
        let config =
            NotifyConfig::default().with_batching(BatchingConfig::default().with_max_size(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_store_capacity_rejected() {
        let batching = BatchingConfig {
            store_capacity: Some(0),
            ..BatchingConfig::default()
        };
        assert!(batching.validate().is_err());
    }

    #[test]
    fn store_capacity_below_max_size_rejected() {
        let result =
            NotifyConfig::from_json_str(r#"{"errorBatching": {"maxSize": 50, "storeCapacity": 10}}"#);
        match result {
            Err(NotifyError::InvalidConfig { reason }) => {
                assert!(reason.contains("storeCapacity"));
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }

        let equal = BatchingConfig {
            store_capacity: Some(50),
            ..BatchingConfig::default()
        };
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn max_age_shorter_than_interval_rejected() {
        let zero = NotifyConfig::from_json_str(r#"{"errorBatching": {"maxAgeMs": 0}}"#);
        assert!(matches!(zero, Err(NotifyError::InvalidConfig { .. })));

        let short = BatchingConfig {
            max_age_ms: Some(30_000),
            ..BatchingConfig::default()
        };
        assert!(short.validate().is_err());

        let long = BatchingConfig {
            max_age_ms: Some(60_000),
            ..BatchingConfig::default()
        };
        assert!(long.validate().is_ok());
    }

    #[test]
    fn store_capacity_scales_with_max_size() {
        let batching = BatchingConfig::default().with_max_size(300);
        assert_eq!(batching.effective_store_capacity(), 600);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = NotifyConfig::from_file("/nonexistent/claw-notify.json");
        assert!(matches!(result, Err(NotifyError::ConfigIo(_))));
    }

    #[test]
    fn serialization_keeps_camel_case_batching_keys() {
        let config = NotifyConfig::default().with_batching(BatchingConfig::default());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"errorBatching\""));
        assert!(json.contains("\"maxMessageLength\""));
        assert!(json.contains("\"max_length\""));
    }
}
