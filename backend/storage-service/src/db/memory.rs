//! In-process repository with the same semantics as the PostgreSQL one.
//!
//! Used by tests across the workspace; the seed helpers let a test place
//! rows at arbitrary points in the past.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use super::MessageRepository;
use crate::config::DEFAULT_TTL_HOURS;
use crate::error::{Result, StorageError};
use crate::models::{NewMessage, ReminderCandidate, ReminderLogEntry, ReminderQuery, StoredMessage};

#[derive(Default)]
struct MemoryState {
    messages: Vec<StoredMessage>,
    reminders: Vec<ReminderLogEntry>,
    next_id: i64,
}

pub struct InMemoryMessageRepository {
    state: Mutex<MemoryState>,
    default_ttl_hours: i64,
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            default_ttl_hours: DEFAULT_TTL_HOURS,
        }
    }

    /// Insert a row as-is and return its id
    pub fn seed_message(
        &self,
        unique_id: &str,
        recipient_email: &str,
        created_at: DateTime<Utc>,
        view_count: i32,
        max_view_count: i32,
    ) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.messages.push(StoredMessage {
            id,
            unique_id: unique_id.to_string(),
            content: "c2VlZGVk".to_string(),
            passphrase_hash: String::new(),
            recipient_email: recipient_email.to_string(),
            view_count,
            max_view_count,
            created_at,
            expires_at: None,
        });
        id
    }

    pub fn seed_reminder(
        &self,
        message_id: i64,
        email_address: &str,
        reminder_count: i32,
        last_reminder_sent: DateTime<Utc>,
    ) {
        self.state.lock().reminders.push(ReminderLogEntry {
            message_id,
            email_address: email_address.to_string(),
            reminder_count,
            last_reminder_sent,
        });
    }

    /// Row regardless of state, for assertions
    pub fn raw_message(&self, unique_id: &str) -> Option<StoredMessage> {
        self.state
            .lock()
            .messages
            .iter()
            .find(|m| m.unique_id == unique_id)
            .cloned()
    }

    pub fn reminders(&self) -> Vec<ReminderLogEntry> {
        self.state.lock().reminders.clone()
    }

    pub fn set_expires_at(&self, unique_id: &str, expires_at: DateTime<Utc>) {
        if let Some(m) = self
            .state
            .lock()
            .messages
            .iter_mut()
            .find(|m| m.unique_id == unique_id)
        {
            m.expires_at = Some(expires_at);
        }
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: &NewMessage) -> Result<()> {
        let mut state = self.state.lock();
        if state.messages.iter().any(|m| m.unique_id == message.unique_id) {
            return Err(StorageError::AlreadyExists);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.messages.push(StoredMessage {
            id,
            unique_id: message.unique_id.clone(),
            content: message.content.clone(),
            passphrase_hash: message.passphrase_hash.clone(),
            recipient_email: message.recipient_email.clone(),
            view_count: 0,
            max_view_count: message.max_view_count,
            created_at: Utc::now(),
            expires_at: Some(message.expires_at),
        });
        Ok(())
    }

    async fn select_and_increment(&self, unique_id: &str) -> Result<StoredMessage> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let row = state
            .messages
            .iter_mut()
            .find(|m| m.unique_id == unique_id)
            .filter(|m| m.is_viewable(now, self.default_ttl_hours))
            .ok_or(StorageError::NotFound)?;
        row.view_count += 1;
        Ok(row.clone())
    }

    async fn get_message(&self, unique_id: &str) -> Result<StoredMessage> {
        let now = Utc::now();
        self.state
            .lock()
            .messages
            .iter()
            .find(|m| m.unique_id == unique_id && m.is_viewable(now, self.default_ttl_hours))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn unviewed_for_reminders(&self, query: ReminderQuery) -> Result<Vec<ReminderCandidate>> {
        let now = Utc::now();
        let state = self.state.lock();
        let age_cutoff = now - Duration::hours(i64::from(query.older_than_hours));
        let interval_cutoff = now - Duration::hours(i64::from(query.reminder_interval_hours));

        let mut candidates: Vec<ReminderCandidate> = state
            .messages
            .iter()
            .filter(|m| {
                m.view_count == 0
                    && !m.recipient_email.is_empty()
                    && m.created_at < age_cutoff
                    && m.effective_expiry(self.default_ttl_hours) > now
            })
            .filter(|m| {
                match state
                    .reminders
                    .iter()
                    .find(|r| r.message_id == m.id && r.email_address == m.recipient_email)
                {
                    None => true,
                    Some(log) => {
                        log.reminder_count < query.max_reminders
                            && log.last_reminder_sent < interval_cutoff
                    }
                }
            })
            .map(|m| ReminderCandidate {
                message_id: m.id,
                unique_id: m.unique_id.clone(),
                recipient_email: m.recipient_email.clone(),
                created_at: m.created_at,
                days_old: i32::try_from((now - m.created_at).num_days()).unwrap_or(i32::MAX),
            })
            .collect();
        candidates.sort_by_key(|c| c.created_at);
        Ok(candidates)
    }

    async fn reminder_history(&self, message_id: i64) -> Result<Vec<ReminderLogEntry>> {
        let mut entries: Vec<ReminderLogEntry> = self
            .state
            .lock()
            .reminders
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.last_reminder_sent.cmp(&a.last_reminder_sent));
        Ok(entries)
    }

    async fn log_reminder_sent(&self, message_id: i64, email_address: &str) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock();
        if !state.messages.iter().any(|m| m.id == message_id) {
            return Err(StorageError::NotFound);
        }
        match state
            .reminders
            .iter_mut()
            .find(|r| r.message_id == message_id && r.email_address == email_address)
        {
            Some(entry) => {
                entry.reminder_count = entry.reminder_count.saturating_add(1);
                entry.last_reminder_sent = entry.last_reminder_sent.max(now);
            }
            None => state.reminders.push(ReminderLogEntry {
                message_id,
                email_address: email_address.to_string(),
                reminder_count: 1,
                last_reminder_sent: now,
            }),
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let ttl = self.default_ttl_hours;
        let mut state = self.state.lock();
        let before = state.messages.len();
        state.messages.retain(|m| m.is_viewable(now, ttl));
        // Mirrors ON DELETE CASCADE
        let kept_ids: Vec<i64> = state.messages.iter().map(|m| m.id).collect();
        state.reminders.retain(|r| kept_ids.contains(&r.message_id));
        Ok((before - state.messages.len()) as u64)
    }
}
