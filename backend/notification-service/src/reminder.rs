//! Reminder scheduler
//!
//! One tick per invocation: ask Storage for unviewed messages that are due,
//! queue a reminder envelope for each, and record the send. Every Storage
//! call goes through the retry loop and the scheduler's circuit breaker.
//! Candidates are processed sequentially and fail independently; the tick
//! only fails when every candidate failed.

use std::future::Future;
use std::sync::Arc;

use email_validation::{mask_email_for_logging, validate_email};
use error_types::ServiceResult;
use message_queue::{EnvelopePublisher, NotificationEnvelope, TemplateKind};
use resilience::{
    with_retry_cancellable, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, RetryConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ReminderSettings;
use crate::error::ReminderError;
use crate::metrics;
use crate::storage::{ReminderCandidate, ReminderStore};

/// Body of every reminder; the decrypt key is not retained so no link can
/// be rebuilt
pub const REMINDER_CONTENT: &str = "Please check your original email for the secure decrypt link. For security reasons, the decrypt link cannot be included in reminder emails. If you cannot find the original email, please contact the sender to resend the message.";

pub fn reminder_subject(reminder_number: i32) -> String {
    format!(
        "Reminder: You have an unviewed encrypted message (Reminder #{})",
        reminder_number
    )
}

/// `From:` identity written into reminder envelopes
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub candidates: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct ReminderScheduler {
    store: Arc<dyn ReminderStore>,
    publisher: Arc<dyn EnvelopePublisher>,
    settings: ReminderSettings,
    identity: ServerIdentity,
    retry: RetryConfig,
    breaker: CircuitBreaker,
    dry_run: bool,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        publisher: Arc<dyn EnvelopePublisher>,
        settings: ReminderSettings,
        identity: ServerIdentity,
    ) -> Self {
        Self {
            store,
            publisher,
            settings,
            identity,
            retry: RetryConfig::default(),
            breaker: CircuitBreaker::new("storage", CircuitBreakerConfig::default()),
            dry_run: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// List candidates without publishing or writing to Storage
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// One reminder pass over the unviewed messages Storage reports as due.
    ///
    /// Delivery is at least once. Each envelope is published before its
    /// reminder is logged, so a failed log write leaves the message a
    /// candidate and the next tick publishes the same reminder again. A
    /// failed publish is never logged, so no reminder is counted unsent.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<TickSummary, ReminderError> {
        if !self.settings.enabled {
            info!("Reminder processing disabled, skipping");
            metrics::record_run("disabled");
            return Ok(TickSummary::default());
        }

        info!(
            check_after_hours = self.settings.check_after_hours,
            max_reminders = self.settings.max_reminders,
            reminder_interval_hours = self.settings.reminder_interval_hours,
            dry_run = self.dry_run,
            "Starting reminder run"
        );

        let candidates = match self
            .storage_call(cancel, || self.store.unviewed_messages(&self.settings))
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                metrics::record_run(run_outcome(&e));
                return Err(e);
            }
        };

        let mut summary = TickSummary {
            candidates: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            info!("No messages due for a reminder");
            metrics::record_run("empty");
            return Ok(summary);
        }

        if self.dry_run {
            for candidate in &candidates {
                info!(
                    message_id = candidate.message_id,
                    recipient = %mask_email_for_logging(&candidate.recipient_email),
                    days_old = candidate.days_old,
                    "Reminder candidate (dry run)"
                );
            }
            return Ok(summary);
        }

        for candidate in &candidates {
            if cancel.is_cancelled() {
                metrics::record_run("cancelled");
                return Err(ReminderError::Cancelled);
            }

            match self.remind(candidate, cancel).await {
                Ok(()) => {
                    summary.sent += 1;
                    metrics::record_candidate("sent");
                }
                Err(ReminderError::Cancelled) => {
                    metrics::record_run("cancelled");
                    return Err(ReminderError::Cancelled);
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::record_candidate("failed");
                    warn!(
                        message_id = candidate.message_id,
                        recipient = %mask_email_for_logging(&candidate.recipient_email),
                        error = %e,
                        "Reminder failed for candidate"
                    );
                }
            }
        }

        info!(
            candidates = summary.candidates,
            sent = summary.sent,
            failed = summary.failed,
            "Reminder run finished"
        );

        if summary.sent == 0 {
            metrics::record_run("failed");
            return Err(ReminderError::AllFailed {
                failed: summary.failed,
            });
        }
        metrics::record_run("success");
        Ok(summary)
    }

    async fn remind(
        &self,
        candidate: &ReminderCandidate,
        cancel: &CancellationToken,
    ) -> Result<(), ReminderError> {
        validate_email(&candidate.recipient_email).map_err(|_| ReminderError::InvalidRecipient)?;

        let history = self
            .storage_call(cancel, || self.store.reminder_history(candidate.message_id))
            .await?;
        let previous = history
            .iter()
            .find(|entry| entry.email_address == candidate.recipient_email)
            .or_else(|| history.first())
            .map_or(0, |entry| entry.reminder_count);
        let reminder_number = previous + 1;

        let envelope = NotificationEnvelope {
            sender_email: self.identity.email.clone(),
            sender_name: self.identity.name.clone(),
            recipient_email: candidate.recipient_email.clone(),
            unique_id: candidate.unique_id.clone(),
            content: REMINDER_CONTENT.to_string(),
            subject: reminder_subject(reminder_number),
            ..Default::default()
        }
        .with_kind(TemplateKind::Reminder);

        self.publisher.publish(&envelope).await?;

        self.storage_call(cancel, || {
            self.store
                .log_reminder_sent(candidate.message_id, &candidate.recipient_email)
        })
        .await?;

        info!(
            message_id = candidate.message_id,
            recipient = %mask_email_for_logging(&candidate.recipient_email),
            reminder_number,
            "Reminder queued"
        );
        Ok(())
    }

    /// Retry with backoff, each attempt gated by the circuit breaker
    async fn storage_call<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, ReminderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let breaker = &self.breaker;
        with_retry_cancellable(&self.retry, cancel, ReminderError::is_retryable, || {
            let attempt = call();
            async move {
                breaker.call(|| attempt).await.map_err(|e| match e {
                    CircuitBreakerError::Open => ReminderError::CircuitOpen,
                    CircuitBreakerError::CallFailed(err) => ReminderError::Storage(err),
                })
            }
        })
        .await
        .map_err(|e| e.into_inner().unwrap_or(ReminderError::Cancelled))
    }
}

fn run_outcome(err: &ReminderError) -> &'static str {
    match err {
        ReminderError::Cancelled => "cancelled",
        _ => "failed",
    }
}
