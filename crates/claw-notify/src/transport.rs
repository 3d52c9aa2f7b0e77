//! Worker transports for delivering chat messages.
//!
//! This module provides the [`WorkerTransport`] trait and implementations
//! that hand formatted messages to the downstream notification worker.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{NotifyError, Result};
use crate::types::ChatMessage;

/// Trait for delivering messages to a notification worker.
///
/// One call corresponds to one outbound request. Implementations must not
/// retry internally; the caller owns timeouts and failure handling.
pub trait WorkerTransport: Send + Sync + fmt::Debug {
    /// Returns the name of this transport.
    fn name(&self) -> &str;

    /// Delivers `messages` to `worker`.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Dispatch` if the worker cannot be reached or
    /// rejects the call.
    fn call<'a>(
        &'a self,
        worker: &'a str,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Sends messages as a JSON POST to `<base_url>/<worker>`.
#[derive(Debug, Clone)]
pub struct HttpWorkerTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkerTransport {
    /// Creates a transport targeting `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` if the URL is empty or the HTTP
    /// client cannot be built.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(NotifyError::InvalidConfig {
                reason: "worker endpoint URL cannot be empty".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| NotifyError::InvalidConfig {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, base_url })
    }

    /// Returns the URL used for `worker`.
    #[must_use]
    pub fn worker_url(&self, worker: &str) -> String {
        format!("{}/{}", self.base_url, worker)
    }
}

impl WorkerTransport for HttpWorkerTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn call<'a>(
        &'a self,
        worker: &'a str,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.worker_url(worker);
            debug!(url = %url, messages = messages.len(), "calling notification worker");

            let response = self
                .client
                .post(&url)
                .json(messages)
                .send()
                .await
                .map_err(|e| NotifyError::Dispatch {
                    reason: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(NotifyError::Dispatch {
                    reason: format!("worker {worker} responded with {status}"),
                });
            }

            Ok(())
        })
    }
}

/// A transport that writes messages to `tracing` instead of a worker.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

impl WorkerTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    fn call<'a>(
        &'a self,
        worker: &'a str,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            for message in messages {
                info!(
                    worker = %worker,
                    channel = %message.channel,
                    text = %message.text,
                    "NOTIFY"
                );
            }
            Ok(())
        })
    }
}
