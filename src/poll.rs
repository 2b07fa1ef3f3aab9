//! Cancellable polling for eventually consistent reads.
//!
//! Graph can return 404 for an object for a few seconds after it was
//! created. `await_condition` re-runs a check until it yields a value, the
//! attempts run out, or the caller cancels.

use crate::config::GeoExceptionSettings;
use crate::error::{CaError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay between every attempt
    Fixed,
    /// Delay multiplied by `factor` after each attempt, capped at `max`
    Exponential { factor: u32, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl PollSettings {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { factor, max } => {
                let multiplier = factor.max(1).saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(multiplier).min(max)
            }
        }
    }
}

impl From<&GeoExceptionSettings> for PollSettings {
    fn from(settings: &GeoExceptionSettings) -> Self {
        PollSettings::fixed(settings.verify_attempts, settings.verify_delay())
    }
}

/// Cancels every `CancelSignal` subscribed to it
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        // no receivers left is fine
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Runs `check` until it returns `Some`, sleeping between attempts.
///
/// Returns `ConditionTimeout` once `max_attempts` checks have failed and
/// `Cancelled` if `cancel` fires first (including mid-sleep).
pub async fn await_condition<T, F, Fut>(
    what: &str,
    mut check: F,
    settings: &PollSettings,
    cancel: &CancelSignal,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut cancel = cancel.clone();
    let max_attempts = settings.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(CaError::Cancelled);
        }

        if let Some(value) = check().await {
            debug!(what, attempt, "condition met");
            return Ok(value);
        }

        if attempt < max_attempts {
            let delay = settings.delay_after(attempt);
            debug!(what, attempt, max_attempts, ?delay, "condition not met yet");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(CaError::Cancelled),
            }
        }
    }

    Err(CaError::ConditionTimeout {
        what: what.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_exponential_delay_is_capped() {
        let settings = PollSettings {
            max_attempts: 10,
            delay: Duration::from_secs(1),
            backoff: Backoff::Exponential {
                factor: 2,
                max: Duration::from_secs(5),
            },
        };
        assert_eq!(settings.delay_after(1), Duration::from_secs(1));
        assert_eq!(settings.delay_after(2), Duration::from_secs(2));
        assert_eq!(settings.delay_after(3), Duration::from_secs(4));
        assert_eq!(settings.delay_after(4), Duration::from_secs(5));
        assert_eq!(settings.delay_after(40), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_some_attempts() {
        let calls = &AtomicU32::new(0);
        let settings = PollSettings::fixed(10, Duration::from_secs(3));
        let start = Instant::now();

        let value = await_condition(
            "location",
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                (n == 3).then_some(n)
            },
            &settings,
            &CancelSignal::never(),
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert!(start.elapsed() < Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let calls = &AtomicU32::new(0);
        let settings = PollSettings::fixed(4, Duration::from_millis(500));

        let err = await_condition(
            "location L2",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                None::<()>
            },
            &settings,
            &CancelSignal::never(),
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            CaError::ConditionTimeout { what, attempts } => {
                assert_eq!(what, "location L2");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let (handle, signal) = cancel_pair();
        let settings = PollSettings::fixed(10, Duration::from_secs(60));
        let start = Instant::now();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        });

        let err = await_condition("never", || async { None::<()> }, &settings, &signal)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, CaError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_check() {
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let calls = &AtomicU32::new(0);

        let result = await_condition(
            "anything",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(())
            },
            &PollSettings::fixed(3, Duration::from_millis(1)),
            &signal,
        )
        .await;

        assert!(matches!(result, Err(CaError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
