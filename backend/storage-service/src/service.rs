//! Validation and defaults in front of the repository

use chrono::{DateTime, Duration, Utc};
use email_validation::{mask_email_for_logging, validate_email};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RetentionSettings;
use crate::db::MessageRepository;
use crate::error::{Result, StorageError};
use crate::models::{NewMessage, ReminderCandidate, ReminderLogEntry, ReminderQuery, StoredMessage};

pub const MIN_VIEW_COUNT: i32 = 1;
pub const MAX_VIEW_COUNT: i32 = 100;

/// Unvalidated insert as it arrives over the wire
#[derive(Debug, Clone, Default)]
pub struct InsertMessage {
    pub unique_id: String,
    pub content: String,
    pub passphrase_hash: String,
    pub max_view_count: i32,
    pub recipient_email: String,
    /// `None` selects the default TTL
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct StorageService {
    repo: Arc<dyn MessageRepository>,
    retention: RetentionSettings,
}

impl StorageService {
    pub fn new(repo: Arc<dyn MessageRepository>, retention: RetentionSettings) -> Self {
        Self { repo, retention }
    }

    pub async fn insert(&self, message: InsertMessage) -> Result<()> {
        let new_message = self.validate_insert(message, Utc::now())?;
        self.repo.insert(&new_message).await?;
        info!(
            unique_id = %new_message.unique_id,
            max_view_count = new_message.max_view_count,
            expires_at = %new_message.expires_at,
            "Message stored"
        );
        Ok(())
    }

    fn validate_insert(&self, message: InsertMessage, now: DateTime<Utc>) -> Result<NewMessage> {
        if message.unique_id.trim().is_empty() {
            return Err(StorageError::invalid("unique_id must not be empty"));
        }
        if message.content.is_empty() {
            return Err(StorageError::invalid("content must not be empty"));
        }
        if !(MIN_VIEW_COUNT..=MAX_VIEW_COUNT).contains(&message.max_view_count) {
            return Err(StorageError::invalid(format!(
                "max_view_count must be between {} and {}",
                MIN_VIEW_COUNT, MAX_VIEW_COUNT
            )));
        }
        if !message.recipient_email.is_empty() {
            validate_email(&message.recipient_email)
                .map_err(|e| StorageError::invalid(format!("recipient_email: {}", e)))?;
        }

        let expires_at = match message.expires_at {
            None => now + Duration::hours(self.retention.default_ttl_hours),
            Some(at) if at <= now => {
                return Err(StorageError::invalid("expires_at must be in the future"))
            }
            Some(at) if at > now + Duration::hours(self.retention.max_expiration_hours) => {
                return Err(StorageError::invalid(format!(
                    "expires_at must be within {} hours",
                    self.retention.max_expiration_hours
                )))
            }
            Some(at) => at,
        };

        Ok(NewMessage {
            unique_id: message.unique_id,
            content: message.content,
            passphrase_hash: message.passphrase_hash,
            recipient_email: message.recipient_email,
            max_view_count: message.max_view_count,
            expires_at,
        })
    }

    /// Consume one view
    pub async fn select(&self, unique_id: &str) -> Result<StoredMessage> {
        require_unique_id(unique_id)?;
        let row = self.repo.select_and_increment(unique_id).await?;
        info!(
            unique_id = %unique_id,
            view_count = row.view_count,
            max_view_count = row.max_view_count,
            "Message view consumed"
        );
        Ok(row)
    }

    /// Peek without consuming a view
    pub async fn get_message(&self, unique_id: &str) -> Result<StoredMessage> {
        require_unique_id(unique_id)?;
        self.repo.get_message(unique_id).await
    }

    pub async fn unviewed_for_reminders(&self, query: ReminderQuery) -> Result<Vec<ReminderCandidate>> {
        check_range("older_than_hours", query.older_than_hours, 1, 8760)?;
        check_range("max_reminders", query.max_reminders, 1, 10)?;
        check_range("reminder_interval_hours", query.reminder_interval_hours, 1, 720)?;

        let candidates = self.repo.unviewed_for_reminders(query).await?;
        debug!(count = candidates.len(), ?query, "Reminder candidates");
        Ok(candidates)
    }

    pub async fn reminder_history(&self, message_id: i64) -> Result<Vec<ReminderLogEntry>> {
        require_message_id(message_id)?;
        self.repo.reminder_history(message_id).await
    }

    pub async fn log_reminder_sent(&self, message_id: i64, email_address: &str) -> Result<()> {
        require_message_id(message_id)?;
        validate_email(email_address)
            .map_err(|e| StorageError::invalid(format!("email_address: {}", e)))?;

        self.repo.log_reminder_sent(message_id, email_address).await?;
        info!(
            message_id,
            recipient = %mask_email_for_logging(email_address),
            "Reminder logged"
        );
        Ok(())
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.repo.cleanup_expired().await
    }
}

fn require_unique_id(unique_id: &str) -> Result<()> {
    if unique_id.trim().is_empty() {
        return Err(StorageError::invalid("unique_id must not be empty"));
    }
    Ok(())
}

fn require_message_id(message_id: i64) -> Result<()> {
    if message_id <= 0 {
        return Err(StorageError::invalid("message_id must be positive"));
    }
    Ok(())
}

fn check_range(field: &str, value: i32, min: i32, max: i32) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(StorageError::invalid(format!(
            "{} must be between {} and {}",
            field, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryMessageRepository;

    fn service() -> StorageService {
        StorageService::new(
            Arc::new(InMemoryMessageRepository::new()),
            RetentionSettings::default(),
        )
    }

    fn valid() -> InsertMessage {
        InsertMessage {
            unique_id: "0123456789abcdefghij".into(),
            content: "Y2lwaGVydGV4dA==".into(),
            max_view_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_ttl_applied() {
        let now = Utc::now();
        let message = service().validate_insert(valid(), now).unwrap();
        assert_eq!(message.expires_at, now + Duration::hours(168));
    }

    #[test]
    fn test_insert_rejections() {
        let svc = service();
        let now = Utc::now();

        let cases = [
            InsertMessage { unique_id: String::new(), ..valid() },
            InsertMessage { content: String::new(), ..valid() },
            InsertMessage { max_view_count: 0, ..valid() },
            InsertMessage { max_view_count: 101, ..valid() },
            InsertMessage { recipient_email: "not-an-email".into(), ..valid() },
            InsertMessage { expires_at: Some(now - Duration::seconds(1)), ..valid() },
            InsertMessage { expires_at: Some(now + Duration::hours(721)), ..valid() },
        ];
        for case in cases {
            assert!(matches!(
                svc.validate_insert(case, now),
                Err(StorageError::InvalidArgument(_))
            ));
        }

        let at_limit = InsertMessage {
            expires_at: Some(now + Duration::hours(720)),
            max_view_count: 100,
            ..valid()
        };
        assert!(svc.validate_insert(at_limit, now).is_ok());
    }

    #[tokio::test]
    async fn test_reminder_query_ranges() {
        let svc = service();
        let bad = ReminderQuery {
            older_than_hours: 0,
            max_reminders: 3,
            reminder_interval_hours: 24,
        };
        assert!(svc.unviewed_for_reminders(bad).await.is_err());

        let good = ReminderQuery {
            older_than_hours: 24,
            ..bad
        };
        assert!(svc.unviewed_for_reminders(good).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_reminder_requires_valid_email() {
        let svc = service();
        assert!(matches!(
            svc.log_reminder_sent(1, "nope").await,
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            svc.log_reminder_sent(0, "a@b.c").await,
            Err(StorageError::InvalidArgument(_))
        ));
    }
}
