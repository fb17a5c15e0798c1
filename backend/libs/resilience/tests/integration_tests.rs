/// Integration tests for resilience library
use resilience::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState},
    retry::{with_retry_cancellable, RetryConfig, RetryError},
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn single_attempt() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        ..Default::default()
    }
}

// ==================== Circuit Breaker Tests ====================

#[tokio::test]
async fn test_five_failures_open_and_sixth_call_fails_fast() {
    let cb = CircuitBreaker::new("storage", CircuitBreakerConfig::default());
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..5 {
        let calls = calls.clone();
        let result = cb
            .call(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("connection refused")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::CallFailed(_))));
    }
    assert_eq!(cb.state(), CircuitState::Open);

    let probe_calls = calls.clone();
    let result = cb
        .call(|| async move {
            probe_calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;

    assert!(matches!(result, Err(CircuitBreakerError::Open)));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_probe_allowed_after_cool_down() {
    let config = CircuitBreakerConfig {
        failure_threshold: 5,
        timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let cb = CircuitBreaker::new("storage", config);

    for _ in 0..5 {
        let _ = cb.call(|| async { Err::<(), _>("error") }).await;
    }
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let result = cb.call(|| async { Ok::<_, String>("recovered") }).await;
    assert_eq!(result.unwrap(), "recovered");
    assert_eq!(cb.state(), CircuitState::Closed);
}

// ==================== Retry + Circuit Breaker ====================

#[tokio::test]
async fn test_retry_stops_when_breaker_opens() {
    let config = CircuitBreakerConfig {
        failure_threshold: 2,
        ..Default::default()
    };
    let cb = CircuitBreaker::new("storage", config);
    let retry = RetryConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(5),
        ..Default::default()
    };
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    let result = with_retry_cancellable(&retry, &CancellationToken::new(), |_| true, || {
        let counter = counter.clone();
        let cb = cb.clone();
        async move {
            cb.call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("unavailable")
            })
            .await
        }
    })
    .await;

    // Third attempt is rejected by the open breaker
    assert!(matches!(
        result,
        Err(RetryError::MaxRetriesExceeded {
            attempts: 3,
            last_error: CircuitBreakerError::Open
        })
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_already_cancelled_token_skips_call() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    let result = with_retry_cancellable(&single_attempt(), &cancel, |_| true, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, String>(()) }
    })
    .await;

    assert!(matches!(result, Err(RetryError::Cancelled)));
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}
