use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::MessageRepository;
use crate::error::{Result, StorageError};
use crate::models::{NewMessage, ReminderCandidate, ReminderLogEntry, ReminderQuery, StoredMessage};

const MESSAGE_COLUMNS: &str = "id, uniqueid AS unique_id, message AS content, \
     other_lastname AS passphrase_hash, other_email AS recipient_email, \
     view_count, max_view_count, created AS created_at, expires_at";

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
    default_ttl_hours: i32,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool, default_ttl_hours: i64) -> Self {
        Self {
            pool,
            default_ttl_hours: i32::try_from(default_ttl_hours).unwrap_or(i32::MAX),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: &NewMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages \
             (message, uniqueid, other_lastname, other_email, view_count, max_view_count, expires_at) \
             VALUES ($1, $2, $3, $4, 0, $5, $6)",
        )
        .bind(&message.content)
        .bind(&message.unique_id)
        .bind(&message.passphrase_hash)
        .bind(&message.recipient_email)
        .bind(message.max_view_count)
        .bind(message.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn select_and_increment(&self, unique_id: &str) -> Result<StoredMessage> {
        // The row lock taken by UPDATE serializes concurrent readers; the
        // guard makes a consumed or expired row match nothing.
        let query = format!(
            "UPDATE messages SET view_count = view_count + 1 \
             WHERE uniqueid = $1 \
               AND view_count < max_view_count \
               AND COALESCE(expires_at, created + make_interval(hours => $2)) > NOW() \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, StoredMessage>(&query)
            .bind(unique_id)
            .bind(self.default_ttl_hours)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(StorageError::NotFound)
    }

    async fn get_message(&self, unique_id: &str) -> Result<StoredMessage> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE uniqueid = $1 \
               AND view_count < max_view_count \
               AND COALESCE(expires_at, created + make_interval(hours => $2)) > NOW()"
        );
        let row = sqlx::query_as::<_, StoredMessage>(&query)
            .bind(unique_id)
            .bind(self.default_ttl_hours)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(StorageError::NotFound)
    }

    async fn unviewed_for_reminders(&self, query: ReminderQuery) -> Result<Vec<ReminderCandidate>> {
        let rows = sqlx::query_as::<_, ReminderCandidate>(
            "SELECT m.id AS message_id, m.uniqueid AS unique_id, m.other_email AS recipient_email, \
                    m.created AS created_at, \
                    FLOOR(EXTRACT(EPOCH FROM (NOW() - m.created)) / 86400)::INT4 AS days_old \
             FROM messages m \
             LEFT JOIN email_reminders er \
               ON er.message_id = m.id AND er.email_address = m.other_email \
             WHERE m.view_count = 0 \
               AND m.other_email <> '' \
               AND m.created < NOW() - make_interval(hours => $1) \
               AND COALESCE(m.expires_at, m.created + make_interval(hours => $4)) > NOW() \
               AND (er.message_id IS NULL OR er.reminder_count < $2) \
               AND (er.last_reminder_sent IS NULL \
                    OR er.last_reminder_sent < NOW() - make_interval(hours => $3)) \
             ORDER BY m.created ASC",
        )
        .bind(query.older_than_hours)
        .bind(query.max_reminders)
        .bind(query.reminder_interval_hours)
        .bind(self.default_ttl_hours)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Unviewed reminder candidates selected");
        Ok(rows)
    }

    async fn reminder_history(&self, message_id: i64) -> Result<Vec<ReminderLogEntry>> {
        let rows = sqlx::query_as::<_, ReminderLogEntry>(
            "SELECT message_id, email_address, reminder_count, last_reminder_sent \
             FROM email_reminders \
             WHERE message_id = $1 \
             ORDER BY last_reminder_sent DESC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn log_reminder_sent(&self, message_id: i64, email_address: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO email_reminders (message_id, email_address, reminder_count, last_reminder_sent) \
             VALUES ($1, $2, 1, NOW()) \
             ON CONFLICT (message_id, email_address) DO UPDATE \
             SET reminder_count = email_reminders.reminder_count + 1, \
                 last_reminder_sent = GREATEST(email_reminders.last_reminder_sent, EXCLUDED.last_reminder_sent)",
        )
        .bind(message_id)
        .bind(email_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM messages \
             WHERE view_count >= max_view_count \
                OR COALESCE(expires_at, created + make_interval(hours => $1)) < NOW()",
        )
        .bind(self.default_ttl_hours)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
