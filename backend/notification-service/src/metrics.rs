//! Delivery and reminder metrics, served at `/metrics` while consuming

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts};

pub static EMAILS_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("notification_emails_sent_total", "Emails accepted by the SMTP relay"),
        &["kind"],
    )
    .expect("failed to create notification_emails_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_emails_sent_total");
    counter
});

/// Deliveries acked without sending: `poison`, `invalid_envelope`,
/// `header_injection`, `render`, `permanent_failure`
pub static EMAILS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("notification_emails_dropped_total", "Deliveries acked and dropped"),
        &["reason"],
    )
    .expect("failed to create notification_emails_dropped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_emails_dropped_total");
    counter
});

pub static EMAILS_REQUEUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notification_emails_requeued_total",
        "Deliveries nacked for redelivery after a transient failure",
    )
    .expect("failed to create notification_emails_requeued_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_emails_requeued_total");
    counter
});

/// Per-candidate reminder outcomes: `sent`, `failed`
pub static REMINDER_CANDIDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("reminder_candidates_total", "Reminder candidates processed"),
        &["outcome"],
    )
    .expect("failed to create reminder_candidates_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register reminder_candidates_total");
    counter
});

/// Whole-tick outcomes: `success`, `empty`, `disabled`, `failed`, `cancelled`
pub static REMINDER_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("reminder_runs_total", "Reminder ticks by outcome"),
        &["outcome"],
    )
    .expect("failed to create reminder_runs_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register reminder_runs_total");
    counter
});

pub fn record_sent(kind: &str) {
    EMAILS_SENT_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_dropped(reason: &str) {
    EMAILS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_requeued() {
    EMAILS_REQUEUED_TOTAL.inc();
}

pub fn record_candidate(outcome: &str) {
    REMINDER_CANDIDATES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_run(outcome: &str) {
    REMINDER_RUNS_TOTAL.with_label_values(&[outcome]).inc();
}
