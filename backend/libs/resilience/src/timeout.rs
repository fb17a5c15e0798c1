//! Deadlines for SMTP sends and queue publishes
use std::future::Future;
use std::time::Duration;

use crate::metrics::TimeoutMetrics;

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("no result within {0:?}")]
    Elapsed(Duration),
    #[error("{0}")]
    OperationFailed(E),
}

impl<E> TimeoutError<E> {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed(_))
    }
}

/// Bound an infallible future by `limit`
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> Result<T, TimeoutError<()>>
where
    F: Future<Output = T>,
{
    with_timeout_result(limit, async { Ok::<_, ()>(future.await) }).await
}

/// Bound a fallible future by `limit`, keeping its own error apart from
/// the deadline
pub async fn with_timeout_result<F, T, E>(limit: Duration, future: F) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    let (outcome, result) = match tokio::time::timeout(limit, future).await {
        Err(_) => ("elapsed", Err(TimeoutError::Elapsed(limit))),
        Ok(Err(e)) => ("failed", Err(TimeoutError::OperationFailed(e))),
        Ok(Ok(value)) => ("completed", Ok(value)),
    };
    TimeoutMetrics::record_operation(outcome);
    result
}
