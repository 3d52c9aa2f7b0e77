//! Error types for the claw-notify crate.

use thiserror::Error;

/// Errors that can occur while batching or dispatching notifications.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The worker transport rejected or failed the call.
    #[error("dispatch failed: {reason}")]
    Dispatch {
        /// The reason the dispatch failed.
        reason: String,
    },

    /// The worker transport did not answer in time.
    #[error("dispatch timed out after {timeout_ms}ms")]
    DispatchTimeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The notifier has been shut down and no longer batches.
    #[error("notifier is shut down")]
    ShutDown,

    /// An eager flush could not be scheduled outside a Tokio runtime.
    #[error("no async runtime available to schedule a flush")]
    NoRuntime,
}

impl From<serde_json::Error> for NotifyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
