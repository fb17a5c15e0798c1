//! Resilience metrics
//!
//! Registered on the default Prometheus registry when the `metrics` feature
//! is on, so a service's `/metrics` endpoint picks them up. Without the
//! feature every recorder is a no-op.

#[cfg(feature = "metrics")]
mod registry {
    use once_cell::sync::Lazy;
    use prometheus::{
        register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
    };

    pub(super) static BREAKER_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "circuit_breaker_transitions_total",
            "Circuit breaker state changes",
            &["breaker", "from", "to"]
        )
        .expect("circuit_breaker_transitions_total registers once")
    });

    pub(super) static BREAKER_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "circuit_breaker_calls_total",
            "Calls seen by a circuit breaker, by the state they met",
            &["breaker", "state", "result"]
        )
        .expect("circuit_breaker_calls_total registers once")
    });

    pub(super) static BREAKER_OPEN_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
        register_histogram_vec!(
            "circuit_breaker_open_seconds",
            "Time a circuit breaker spent open",
            &["breaker"],
            vec![1.0, 5.0, 30.0, 60.0, 300.0, 1800.0]
        )
        .expect("circuit_breaker_open_seconds registers once")
    });

    pub(super) static DEADLINES: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "deadline_operations_total",
            "Operations run under a deadline, by outcome",
            &["outcome"]
        )
        .expect("deadline_operations_total registers once")
    });

    pub(super) static RETRY_ATTEMPTS: Lazy<HistogramVec> = Lazy::new(|| {
        register_histogram_vec!(
            "retry_attempts",
            "Attempts used before a retried operation settled",
            &["outcome"],
            vec![1.0, 2.0, 3.0, 5.0, 10.0]
        )
        .expect("retry_attempts registers once")
    });
}

pub(crate) struct CircuitBreakerMetrics;

#[allow(unused_variables)]
impl CircuitBreakerMetrics {
    pub(crate) fn record_state_transition(breaker: &str, from: &str, to: &str) {
        #[cfg(feature = "metrics")]
        registry::BREAKER_TRANSITIONS
            .with_label_values(&[breaker, from, to])
            .inc();
    }

    pub(crate) fn record_call(breaker: &str, state: &str, result: &str) {
        #[cfg(feature = "metrics")]
        registry::BREAKER_CALLS
            .with_label_values(&[breaker, state, result])
            .inc();
    }

    pub(crate) fn record_open_duration(breaker: &str, secs: f64) {
        #[cfg(feature = "metrics")]
        registry::BREAKER_OPEN_SECONDS
            .with_label_values(&[breaker])
            .observe(secs);
    }
}

pub(crate) struct TimeoutMetrics;

#[allow(unused_variables)]
impl TimeoutMetrics {
    pub(crate) fn record_operation(outcome: &str) {
        #[cfg(feature = "metrics")]
        registry::DEADLINES.with_label_values(&[outcome]).inc();
    }
}

pub(crate) struct RetryMetrics;

#[allow(unused_variables)]
impl RetryMetrics {
    pub(crate) fn record_attempts(outcome: &str, attempts: u32) {
        #[cfg(feature = "metrics")]
        registry::RETRY_ATTEMPTS
            .with_label_values(&[outcome])
            .observe(f64::from(attempts));
    }
}
