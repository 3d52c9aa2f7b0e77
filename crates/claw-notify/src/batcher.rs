//! Batched error notifications.
//!
//! This module provides the [`ErrorNotifier`], the main entry point of the
//! crate. It records error occurrences into a [`BatchStore`], flushes them
//! as grouped reports on a timer or when the store fills up, and drains the
//! store once more on shutdown.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::aggregator::group_entries;
use crate::config::{BatchingConfig, NotifyConfig};
use crate::error::{NotifyError, Result};
use crate::fingerprint::{compute_key, error_message};
use crate::formatter::{format_direct_line, format_group_report};
use crate::notifier::{DISPATCH_TIMEOUT, Notifier};
use crate::store::{BatchStore, RecordOutcome};
use crate::timer::FlushTimer;
use crate::transport::{LogTransport, WorkerTransport};
use crate::types::{ErrorEntry, PayloadRecord};

/// What started a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The periodic timer fired.
    Timer,
    /// The store reached its eager-flush threshold.
    Capacity,
    /// A caller asked for a flush.
    Manual,
    /// The notifier is shutting down.
    Shutdown,
}

impl FlushTrigger {
    /// Returns the trigger as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Capacity => "capacity",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        }
    }

    /// Returns true if the flush should wait for one already in progress.
    const fn waits_for_lock(self) -> bool {
        matches!(self, Self::Manual | Self::Shutdown)
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of one flush cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushResult {
    /// Entries taken out of the store.
    pub entries_drained: usize,
    /// Groups formed from those entries.
    pub groups: usize,
    /// Reports accepted by the worker.
    pub reports_sent: usize,
    /// Reports dropped because dispatch is disabled.
    pub reports_skipped: usize,
    /// Reports whose dispatch failed.
    pub report_failures: usize,
    /// True if the flush did nothing because another was in progress.
    pub skipped_in_progress: bool,
}

/// Builder for [`ErrorNotifier`].
#[derive(Debug)]
pub struct ErrorNotifierBuilder {
    config: NotifyConfig,
    transport: Arc<dyn WorkerTransport>,
    store: Option<BatchStore>,
    dispatch_timeout: Duration,
}

impl ErrorNotifierBuilder {
    /// Sets the transport used to reach the notification worker.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn WorkerTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Supplies the bounded store that backs batching.
    #[must_use]
    pub fn batch_store(mut self, store: BatchStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides the per-dispatch timeout.
    #[must_use]
    pub const fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Builds the notifier and starts its flush timer when batching is active.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` if the configuration is invalid,
    /// or `NotifyError::NoRuntime` if batching is active and no Tokio
    /// runtime is available for the timer.
    pub fn build(self) -> Result<ErrorNotifier> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let notifier = Notifier::new(Arc::clone(&config), self.transport)
            .with_timeout(self.dispatch_timeout);

        let batching = match (config.error_batching.clone(), self.store) {
            (Some(settings), Some(store)) => {
                // A smaller store would evict before the eager flush fires.
                if store.capacity() < settings.max_size {
                    return Err(NotifyError::InvalidConfig {
                        reason: format!(
                            "batch store capacity {} is below errorBatching.maxSize {}",
                            store.capacity(),
                            settings.max_size
                        ),
                    });
                }
                Some(Batching {
                    settings,
                    store: Mutex::new(store),
                    flush_lock: tokio::sync::Mutex::new(()),
                    flush_scheduled: AtomicBool::new(false),
                    timer: Mutex::new(None),
                })
            }
            (Some(_), None) => {
                info!("errorBatching configured without a batch store, batching disabled");
                None
            }
            (None, _) => None,
        };

        let inner = Arc::new(Inner {
            config,
            notifier,
            batching,
            shut_down: AtomicBool::new(false),
        });

        if let Some(batching) = &inner.batching {
            let timer = start_flush_timer(&inner, batching.settings.flush_interval())?;
            *batching.timer.lock() = Some(timer);
            info!(
                interval_ms = batching.settings.interval,
                max_size = batching.settings.max_size,
                "error batching enabled"
            );
        }

        Ok(ErrorNotifier { inner })
    }
}

/// Batches error notifications and dispatches them as grouped reports.
///
/// Cloning is cheap; clones share the same store and timer.
#[derive(Debug, Clone)]
pub struct ErrorNotifier {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: Arc<NotifyConfig>,
    notifier: Notifier,
    batching: Option<Batching>,
    shut_down: AtomicBool,
}

#[derive(Debug)]
struct Batching {
    settings: BatchingConfig,
    store: Mutex<BatchStore>,
    /// Serializes flush cycles.
    flush_lock: tokio::sync::Mutex<()>,
    /// Set while a capacity flush is spawned but not yet finished.
    flush_scheduled: AtomicBool,
    timer: Mutex<Option<FlushTimer>>,
}

impl ErrorNotifier {
    /// Starts building a notifier. The default transport logs through `tracing`.
    #[must_use]
    pub fn builder(config: NotifyConfig) -> ErrorNotifierBuilder {
        ErrorNotifierBuilder {
            config,
            transport: Arc::new(LogTransport),
            store: None,
            dispatch_timeout: DISPATCH_TIMEOUT,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &NotifyConfig {
        &self.inner.config
    }

    /// Returns true if errors are batched rather than sent directly.
    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.inner.batching.is_some()
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Returns true while the periodic flush timer is running.
    #[must_use]
    pub fn timer_running(&self) -> bool {
        self.inner
            .batching
            .as_ref()
            .is_some_and(|b| b.timer.lock().as_ref().is_some_and(FlushTimer::is_running))
    }

    /// Returns the number of entries waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner
            .batching
            .as_ref()
            .map_or(0, |b| b.store.lock().len())
    }

    /// Returns a copy of the pending entry for an occurrence, if any.
    #[must_use]
    pub fn pending_entry(
        &self,
        channel: Option<&str>,
        error: &(dyn fmt::Display + Sync),
        source: &str,
    ) -> Option<ErrorEntry> {
        let batching = self.inner.batching.as_ref()?;
        let key = self.fingerprint(channel, error, source);
        batching.store.lock().get(&key).cloned()
    }

    /// Computes the fingerprint an occurrence would be stored under.
    #[must_use]
    pub fn fingerprint(
        &self,
        channel: Option<&str>,
        error: &(dyn fmt::Display + Sync),
        source: &str,
    ) -> String {
        let channel = self.inner.notifier.resolve_channel(channel);
        compute_key(channel, &error_message(error), source)
    }

    /// Records an error occurrence for the next batched report.
    ///
    /// Never fails. Without batching, or when batching is unavailable (after
    /// shutdown, or outside a Tokio runtime), the error is sent directly
    /// through [`log_error`](Self::log_error) with the payload and extras.
    pub async fn enqueue(
        &self,
        channel: Option<&str>,
        error: &(dyn fmt::Display + Sync),
        source: &str,
        payload: Value,
        extras: Vec<Value>,
    ) {
        let Some(batching) = self.inner.batching.as_ref() else {
            self.fallback(channel, error, payload, extras).await;
            return;
        };

        let message = error_message(error);
        let record = PayloadRecord::new(payload, extras);

        match self.inner.try_enqueue(batching, channel, &message, source, record) {
            Ok(outcome) => {
                debug!(
                    source = %source,
                    count = outcome.count,
                    pending = outcome.len,
                    "error batched"
                );
            }
            Err((e, record)) => {
                warn!(error = %e, source = %source, "error batching failed, sending directly");
                self.fallback(channel, error, record.payload, record.extras)
                    .await;
            }
        }
    }

    /// Sends an error and its extras immediately as one line.
    ///
    /// Returns `Ok(false)` when dispatch is disabled.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error if the worker call fails or times out.
    pub async fn log_error(
        &self,
        channel: Option<&str>,
        error: &(dyn fmt::Display + Sync),
        extras: &[Value],
    ) -> Result<bool> {
        let line = format_direct_line(&error_message(error), extras);
        self.inner.notifier.send(channel, &line).await
    }

    /// Flushes pending entries now, waiting for any flush in progress.
    pub async fn flush(&self) -> FlushResult {
        self.inner.flush(FlushTrigger::Manual).await
    }

    /// Stops the timer and drains the store with one final flush.
    ///
    /// Safe to call more than once. Dispatch failures during the drain are
    /// logged and reported in the result; they do not stop the shutdown.
    pub async fn shutdown(&self) -> FlushResult {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!("error notifier already shut down");
        }

        if let Some(batching) = &self.inner.batching {
            if let Some(timer) = batching.timer.lock().take() {
                timer.cancel();
            }
        }

        let result = self.inner.flush(FlushTrigger::Shutdown).await;
        if result.report_failures > 0 {
            warn!(
                failures = result.report_failures,
                "some batched reports could not be delivered during shutdown"
            );
        }

        info!(drained = result.entries_drained, "error notifier shut down");
        result
    }

    async fn fallback(
        &self,
        channel: Option<&str>,
        error: &(dyn fmt::Display + Sync),
        payload: Value,
        mut extras: Vec<Value>,
    ) {
        extras.insert(0, payload);
        if let Err(e) = self.log_error(channel, error, &extras).await {
            warn!(error = %e, "direct error notification failed");
        }
    }
}

impl Inner {
    /// Records one occurrence, scheduling an eager flush when the store is full.
    ///
    /// On failure the record is handed back so the caller can send it directly.
    fn try_enqueue(
        self: &Arc<Self>,
        batching: &Batching,
        channel: Option<&str>,
        message: &str,
        source: &str,
        record: PayloadRecord,
    ) -> std::result::Result<RecordOutcome, (NotifyError, PayloadRecord)> {
        let Ok(runtime) = Handle::try_current() else {
            return Err((NotifyError::NoRuntime, record));
        };

        let channel = self.notifier.resolve_channel(channel);
        let key = compute_key(channel, message, source);

        let outcome = {
            let mut store = batching.store.lock();
            // Checked under the store lock so a concurrent shutdown drain
            // either sees this entry or this call sees the flag.
            if self.shut_down.load(Ordering::SeqCst) {
                return Err((NotifyError::ShutDown, record));
            }
            store.record(&key, message, source, channel, record, Utc::now())
        };

        if outcome.len >= batching.settings.max_size
            && batching
                .flush_scheduled
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            debug!(pending = outcome.len, "batch store at capacity, scheduling flush");
            let inner = Arc::clone(self);
            runtime.spawn(async move {
                inner.flush(FlushTrigger::Capacity).await;
                if let Some(batching) = &inner.batching {
                    batching.flush_scheduled.store(false, Ordering::SeqCst);
                }
            });
        }

        Ok(outcome)
    }

    async fn flush(&self, trigger: FlushTrigger) -> FlushResult {
        let Some(batching) = &self.batching else {
            return FlushResult::default();
        };

        let _guard = if trigger.waits_for_lock() {
            batching.flush_lock.lock().await
        } else if let Ok(guard) = batching.flush_lock.try_lock() {
            guard
        } else {
            debug!(trigger = %trigger, "flush already in progress, skipping");
            return FlushResult {
                skipped_in_progress: true,
                ..FlushResult::default()
            };
        };

        let entries = {
            let mut store = batching.store.lock();
            if store.is_empty() {
                return FlushResult::default();
            }
            store.drain()
        };

        let mut result = FlushResult {
            entries_drained: entries.len(),
            ..FlushResult::default()
        };
        let groups = group_entries(entries);
        result.groups = groups.len();

        // A failed group is logged and counted; the remaining groups are
        // still dispatched. Nothing is re-queued.
        for group in &groups {
            let report = format_group_report(group, batching.settings.max_message_length);
            match self.notifier.send(Some(&group.channel), &report.text).await {
                Ok(true) => result.reports_sent += 1,
                Ok(false) => result.reports_skipped += 1,
                Err(e) => {
                    result.report_failures += 1;
                    warn!(
                        channel = %group.channel,
                        source = %group.source,
                        error_types = group.type_count(),
                        error = %e,
                        "failed to dispatch batched error report"
                    );
                }
            }
        }

        info!(
            trigger = %trigger,
            entries = result.entries_drained,
            groups = result.groups,
            sent = result.reports_sent,
            failed = result.report_failures,
            "flushed batched errors"
        );

        result
    }
}

fn start_flush_timer(inner: &Arc<Inner>, period: Duration) -> Result<FlushTimer> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    FlushTimer::start(period, move || {
        let weak = weak.clone();
        async move {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            inner.flush(FlushTrigger::Timer).await;
            true
        }
    })
}
