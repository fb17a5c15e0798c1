//! Persistence for messages and the reminder log

mod memory;
mod pool;
mod postgres;

pub use memory::InMemoryMessageRepository;
pub use pool::create_pool;
pub use postgres::PgMessageRepository;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewMessage, ReminderCandidate, ReminderLogEntry, ReminderQuery, StoredMessage};

/// Storage backend behind the RPC surface.
///
/// Implementations must make `select_and_increment` atomic per `unique_id`:
/// concurrent callers either each see a distinct post-increment count or
/// get `NotFound`.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Fails with `AlreadyExists` on a `unique_id` collision
    async fn insert(&self, message: &NewMessage) -> Result<()>;

    /// Consume one view and return the post-increment row
    async fn select_and_increment(&self, unique_id: &str) -> Result<StoredMessage>;

    /// Read without consuming a view
    async fn get_message(&self, unique_id: &str) -> Result<StoredMessage>;

    async fn unviewed_for_reminders(&self, query: ReminderQuery) -> Result<Vec<ReminderCandidate>>;

    /// Most recent entry first
    async fn reminder_history(&self, message_id: i64) -> Result<Vec<ReminderLogEntry>>;

    async fn log_reminder_sent(&self, message_id: i64, email_address: &str) -> Result<()>;

    /// Delete consumed and expired rows, returning how many went
    async fn cleanup_expired(&self) -> Result<u64>;
}
