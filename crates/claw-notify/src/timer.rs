//! Periodic flush timer.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{NotifyError, Result};

/// Handle owning a background task that runs a callback on a fixed period.
///
/// The first tick fires one full period after start. Cancelling is
/// idempotent and lets an in-flight callback finish. Dropping the handle
/// cancels the task.
#[derive(Debug)]
pub struct FlushTimer {
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    period: Duration,
}

impl FlushTimer {
    /// Starts the timer on the current Tokio runtime.
    ///
    /// The task stops on its own once `on_tick` resolves to `false`.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::NoRuntime` if called outside a Tokio runtime, or
    /// `NotifyError::InvalidConfig` if `period` is zero.
    pub fn start<F, Fut>(period: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if period.is_zero() {
            return Err(NotifyError::InvalidConfig {
                reason: "flush interval must be greater than zero".to_string(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;

        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if !on_tick().await {
                            break;
                        }
                    }
                }
            }
            debug!("flush timer stopped");
        });

        Ok(Self {
            token,
            handle: Mutex::new(Some(handle)),
            period,
        })
    }

    /// Returns the tick period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Stops the timer. Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("cancelling flush timer");
        }
        self.token.cancel();
        self.handle.lock().take();
    }

    /// Returns true until the timer is cancelled or its task ends.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
            && self
                .handle
                .lock()
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer(period: Duration, stop_after: usize) -> (FlushTimer, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let timer = FlushTimer::start(period, move || {
            let counter = Arc::clone(&counter);
            async move { counter.fetch_add(1, Ordering::SeqCst) + 1 < stop_after }
        })
        .unwrap();
        (timer, ticks)
    }

    #[test]
    fn start_outside_runtime_fails() {
        let result = FlushTimer::start(Duration::from_millis(10), || async { true });
        assert!(matches!(result, Err(NotifyError::NoRuntime)));
    }

    #[tokio::test]
    async fn zero_period_rejected() {
        let result = FlushTimer::start(Duration::ZERO, || async { true });
        assert!(matches!(result, Err(NotifyError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn ticks_periodically() {
        let (timer, ticks) = counting_timer(Duration::from_millis(10), usize::MAX);
        assert!(timer.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(ticks.load(Ordering::SeqCst) >= 2);
        timer.cancel();
    }

    #[tokio::test]
    async fn first_tick_waits_one_period() {
        let (timer, ticks) = counting_timer(Duration::from_secs(60), usize::MAX);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert_eq!(timer.period(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (timer, ticks) = counting_timer(Duration::from_millis(10), usize::MAX);

        timer.cancel();
        timer.cancel();

        assert!(!timer.is_running());
        let after_cancel = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn stops_when_callback_declines() {
        let (timer, ticks) = counting_timer(Duration::from_millis(5), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(!timer.is_running());
    }
}
