//! Retries with capped exponential backoff
//!
//! The delay after failed attempt `n` is `initial_backoff * multiplier^(n-1)`,
//! capped at `max_backoff`. Nothing is slept after the last attempt. A
//! cancelled token ends the loop before the next attempt, including while
//! sleeping.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::RetryMetrics;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts in total, first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Spread each delay by up to 30% either way
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Delay after the given 1-based failed attempt, before jitter
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let steps = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(steps);
        let capped = scaled.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.backoff_for(attempt);
        if !self.jitter {
            return base;
        }
        let spread = rand::thread_rng().gen_range(0.7..1.3);
        base.mul_f64(spread)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: E },
    /// Rejected by the retry classifier
    #[error("{0}")]
    OperationFailed(E),
    #[error("cancelled before the operation succeeded")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// The last error the operation produced, if it ran at all
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::MaxRetriesExceeded { last_error, .. } | RetryError::OperationFailed(last_error) => {
                Some(last_error)
            }
            RetryError::Cancelled => None,
        }
    }
}

/// Retry every error, never cancelled
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    with_retry_cancellable(&config, &CancellationToken::new(), |_| true, f).await
}

/// Retry errors `is_retryable` accepts until attempts run out or `cancel`
/// fires
pub async fn with_retry_cancellable<F, Fut, T, E, R>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    is_retryable: R,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let limit = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            RetryMetrics::record_attempts("cancelled", attempt - 1);
            return Err(RetryError::Cancelled);
        }

        let err = match f().await {
            Ok(value) => {
                RetryMetrics::record_attempts("success", attempt);
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            debug!(attempt, error = %err, "not retrying");
            RetryMetrics::record_attempts("non_retryable", attempt);
            return Err(RetryError::OperationFailed(err));
        }

        if attempt >= limit {
            warn!(attempts = attempt, error = %err, "retries exhausted");
            RetryMetrics::record_attempts("exhausted", attempt);
            return Err(RetryError::MaxRetriesExceeded {
                attempts: attempt,
                last_error: err,
            });
        }

        let delay = config.delay_after(attempt);
        warn!(attempt, max_attempts = limit, error = %err, delay_ms = delay.as_millis() as u64, "attempt failed, backing off");

        tokio::select! {
            _ = cancel.cancelled() => {
                RetryMetrics::record_attempts("cancelled", attempt);
                return Err(RetryError::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
