//! Failure handling shared by the Password Exchange services
//!
//! - [`CircuitBreaker`] stops calling a dependency after consecutive
//!   failures and probes it again after a quiet period
//! - [`with_retry_cancellable`] retries classified-transient errors with
//!   capped exponential backoff and stops when its token is cancelled
//! - [`with_timeout_result`] puts a deadline on SMTP sends and queue
//!   publishes
//!
//! Enable the `metrics` feature to export counters on the default
//! Prometheus registry.
//!
//! ```rust,no_run
//! use resilience::{with_retry_cancellable, CircuitBreaker, CircuitBreakerConfig, RetryConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn fetch() -> Result<Vec<u64>, String> { Ok(vec![]) }
//! # async fn run() {
//! let breaker = CircuitBreaker::new("storage", CircuitBreakerConfig::default());
//! let cancel = CancellationToken::new();
//!
//! let rows = with_retry_cancellable(&RetryConfig::default(), &cancel, |_| true, || {
//!     breaker.call(fetch)
//! })
//! .await;
//! # }
//! ```

pub mod circuit_breaker;
mod metrics;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use retry::{with_retry, with_retry_cancellable, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutError};
