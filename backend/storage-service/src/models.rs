use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// One encrypted message row
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub unique_id: String,
    /// Ciphertext, base64url; never interpreted here
    pub content: String,
    /// bcrypt hash, empty when no passphrase was set
    pub passphrase_hash: String,
    pub recipient_email: String,
    pub view_count: i32,
    pub max_view_count: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredMessage {
    /// Expiry, falling back to `created_at + default_ttl_hours`
    pub fn effective_expiry(&self, default_ttl_hours: i64) -> DateTime<Utc> {
        self.expires_at
            .unwrap_or_else(|| self.created_at + Duration::hours(default_ttl_hours))
    }

    /// Neither consumed nor expired
    pub fn is_viewable(&self, now: DateTime<Utc>, default_ttl_hours: i64) -> bool {
        self.view_count < self.max_view_count && self.effective_expiry(default_ttl_hours) > now
    }
}

/// Validated insert
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub unique_id: String,
    pub content: String,
    pub passphrase_hash: String,
    pub recipient_email: String,
    pub max_view_count: i32,
    pub expires_at: DateTime<Utc>,
}

/// Reminder selection predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderQuery {
    pub older_than_hours: i32,
    pub max_reminders: i32,
    pub reminder_interval_hours: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct ReminderCandidate {
    pub message_id: i64,
    pub unique_id: String,
    pub recipient_email: String,
    pub created_at: DateTime<Utc>,
    pub days_old: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct ReminderLogEntry {
    pub message_id: i64,
    pub email_address: String,
    pub reminder_count: i32,
    pub last_reminder_sent: DateTime<Utc>,
}
