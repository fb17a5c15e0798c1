//! Message lifecycle metrics, registered in the default registry served at
//! `/api/v1/metrics`

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts};

pub static MESSAGES_SUBMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("messages_submitted_total", "Messages stored successfully")
        .expect("failed to create messages_submitted_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messages_submitted_total");
    counter
});

/// Retrieval attempts by outcome: `success`, `not_found`, `invalid_passphrase`,
/// `invalid_key`, `error`
pub static MESSAGES_RETRIEVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("messages_retrieved_total", "Message retrieval attempts"),
        &["outcome"],
    )
    .expect("failed to create messages_retrieved_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messages_retrieved_total");
    counter
});

pub static NOTIFICATION_PUBLISH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notification_publish_failures_total",
        "Initial notification envelopes that could not be queued",
    )
    .expect("failed to create notification_publish_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_publish_failures_total");
    counter
});

pub fn record_retrieval(outcome: &str) {
    MESSAGES_RETRIEVED_TOTAL.with_label_values(&[outcome]).inc();
}
