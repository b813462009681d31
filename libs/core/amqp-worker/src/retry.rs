//! Bounded retry with exponential backoff.
//!
//! Used for broker connection establishment. Delays are deterministic:
//! `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
//! There is no wait after the final attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

/// Backoff schedule for a bounded retry.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    /// 5 attempts with waits of 1s, 2s, 4s and 8s between them.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Every wait a fully exhausted retry goes through, in order.
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|attempt| self.delay_for(attempt)).collect()
    }
}

/// Outcome of a retry that did not produce a value.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("Gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    #[error("Retry cancelled by shutdown")]
    Cancelled,
}

/// Resolves once shutdown is requested: the flag is `true` or the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

pub(crate) fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Run `operation` until it succeeds or `policy.max_attempts` is used up.
///
/// Each wait is logged with its length and the number of tries so far.
/// Shutdown interrupts both a running attempt and a pending wait.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if shutdown_requested(shutdown) {
            return Err(RetryError::Cancelled);
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        let wait = policy.delay_for(attempt);
        warn!(
            error = %error,
            tries = attempt,
            wait_secs = wait.as_secs_f64(),
            "Backing off {:.1} seconds after {} tries",
            wait.as_secs_f64(),
            attempt
        );

        tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn test_delays_never_decrease_and_respect_cap() {
        let policy = BackoffPolicy {
            max_attempts: 12,
            initial_delay: Duration::from_millis(500),
            multiplier: 3.0,
            max_delay: Duration::from_secs(20),
        };

        let delays = policy.delays();
        assert_eq!(delays.len(), 11);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let (_tx, mut rx) = watch::channel(false);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = Instant::now();

        let result: Result<u32, RetryError<String>> =
            retry_with_backoff(&BackoffPolicy::default(), &mut rx, move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 3 { Err(format!("refused #{n}")) } else { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 4);
        // 1s + 2s + 4s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_exactly_max_attempts() {
        let (_tx, mut rx) = watch::channel(false);
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), RetryError<&str>> =
            retry_with_backoff(&BackoffPolicy::default(), &mut rx, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("refused")
            })
            .await;

        match result {
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last_error, "refused");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff_wait() {
        let (tx, mut rx) = watch::channel(false);
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let policy = BackoffPolicy::default();
        let retry = retry_with_backoff(&policy, &mut rx, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("refused")
        });

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            tx.send(true).unwrap();
        };

        let (result, _) = tokio::join!(retry, cancel);
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let (tx, mut rx) = watch::channel(true);
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), RetryError<&str>> =
            retry_with_backoff(&BackoffPolicy::default(), &mut rx, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        wait_for_shutdown(&mut rx).await;
        assert!(shutdown_requested(&rx));
    }
}
