//! Dispatch of formatted text to the chat worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::debug;

use crate::config::NotifyConfig;
use crate::error::{NotifyError, Result};
use crate::transport::WorkerTransport;
use crate::types::ChatMessage;

/// Fixed timeout for one outbound worker call.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Sends `(channel, text)` pairs through a [`WorkerTransport`].
///
/// The notifier applies the environment tag and the `max_length` cap, and
/// resolves the target channel. It makes exactly one transport call per send
/// and never retries.
#[derive(Debug, Clone)]
pub struct Notifier {
    config: Arc<NotifyConfig>,
    transport: Arc<dyn WorkerTransport>,
    timeout: Duration,
}

impl Notifier {
    /// Creates a notifier.
    #[must_use]
    pub fn new(config: Arc<NotifyConfig>, transport: Arc<dyn WorkerTransport>) -> Self {
        Self {
            config,
            transport,
            timeout: DISPATCH_TIMEOUT,
        }
    }

    /// Overrides the dispatch timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns true if dispatch is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enable
    }

    /// Resolves the target channel: the argument if non-empty, else the default.
    #[must_use]
    pub fn resolve_channel<'a>(&'a self, channel: Option<&'a str>) -> &'a str {
        match channel {
            Some(c) if !c.is_empty() => c,
            _ => &self.config.channel,
        }
    }

    /// Applies the environment tag and the length cap to `text`.
    #[must_use]
    pub fn prepare_text(&self, text: &str) -> String {
        let tagged = match self.config.env.as_deref() {
            Some(env) if !env.is_empty() => format!("[{env}] {text}"),
            _ => text.to_string(),
        };
        truncate_chars(tagged, self.config.max_length)
    }

    /// Sends `text` to `channel`.
    ///
    /// Returns `Ok(false)` without contacting the worker when dispatch is
    /// disabled, and `Ok(true)` once the worker accepted the message.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Dispatch` if the transport fails,
    /// `NotifyError::DispatchTimeout` if it does not answer in time, or
    /// `NotifyError::NoRuntime` when polled outside a Tokio runtime.
    pub async fn send(&self, channel: Option<&str>, text: &str) -> Result<bool> {
        if !self.is_enabled() {
            debug!("notifications disabled, message dropped");
            return Ok(false);
        }

        // The dispatch timeout needs a Tokio timer.
        if Handle::try_current().is_err() {
            return Err(NotifyError::NoRuntime);
        }

        let messages = [ChatMessage::new(
            self.resolve_channel(channel),
            self.prepare_text(text),
        )];

        let call = self.transport.call(&self.config.worker, &messages);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(())) => {
                debug!(
                    transport = %self.transport.name(),
                    channel = %messages[0].channel,
                    chars = messages[0].text.chars().count(),
                    "notification sent"
                );
                Ok(true)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(NotifyError::DispatchTimeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl WorkerTransport for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn call<'a>(
            &'a self,
            worker: &'a str,
            messages: &'a [ChatMessage],
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            self.calls
                .lock()
                .push((worker.to_string(), messages.to_vec()));
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Debug)]
    struct Stalled;

    impl WorkerTransport for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        fn call<'a>(
            &'a self,
            _worker: &'a str,
            _messages: &'a [ChatMessage],
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(std::future::pending())
        }
    }

    fn notifier(config: NotifyConfig) -> (Notifier, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::new(Arc::new(config), recorder.clone());
        (notifier, recorder)
    }

    #[tokio::test]
    async fn disabled_returns_false_without_call() {
        let (notifier, recorder) = notifier(NotifyConfig::default().enabled(false));

        let sent = notifier.send(Some("ops"), "hello").await.unwrap();

        assert!(!sent);
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn sends_one_message_to_worker() {
        let (notifier, recorder) = notifier(NotifyConfig::default());

        let sent = notifier.send(Some("ops"), "hello").await.unwrap();

        assert!(sent);
        let calls = recorder.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "chat-notify");
        assert_eq!(calls[0].1, vec![ChatMessage::new("ops", "hello")]);
    }

    #[tokio::test]
    async fn falls_back_to_default_channel() {
        let (notifier, recorder) = notifier(NotifyConfig::default().with_channel("general"));

        notifier.send(None, "a").await.unwrap();
        notifier.send(Some(""), "b").await.unwrap();

        let calls = recorder.calls.lock();
        assert!(calls.iter().all(|(_, m)| m[0].channel == "general"));
    }

    #[tokio::test]
    async fn env_prefix_and_truncation() {
        let config = NotifyConfig::default().with_env("prod").with_max_length(12);
        let (notifier, recorder) = notifier(config);

        notifier.send(None, "something went wrong").await.unwrap();

        let calls = recorder.calls.lock();
        assert_eq!(calls[0].1[0].text, "[prod] somet");
    }

    #[tokio::test]
    async fn timeout_maps_to_dispatch_timeout() {
        let notifier = Notifier::new(Arc::new(NotifyConfig::default()), Arc::new(Stalled))
            .with_timeout(Duration::from_millis(20));

        let result = notifier.send(None, "hello").await;

        assert!(matches!(
            result,
            Err(NotifyError::DispatchTimeout { timeout_ms: 20 })
        ));
    }

    #[test]
    fn send_outside_runtime_is_no_runtime_error() {
        let (notifier, recorder) = notifier(NotifyConfig::default());

        let mut send = std::pin::pin!(notifier.send(None, "hello"));
        let mut cx = std::task::Context::from_waker(std::task::Waker::noop());

        match send.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(result) => {
                assert!(matches!(result, Err(NotifyError::NoRuntime)));
            }
            std::task::Poll::Pending => panic!("send should finish without a runtime"),
        }
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo".to_string(), 2), "hé");
        assert_eq!(truncate_chars("short".to_string(), 10), "short");
    }
}
