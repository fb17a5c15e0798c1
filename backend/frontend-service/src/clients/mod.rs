//! Collaborators of the message lifecycle engine
//!
//! The engine only sees these traits; [`grpc`] provides the tonic-backed
//! implementations used in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_types::ServiceResult;

pub mod grpc;

pub use grpc::{connect_channel, CorrelationForwarder, GrpcEncryptionClient, GrpcStorageClient};

/// Row handed to Storage on submit
#[derive(Debug, Clone, PartialEq)]
pub struct NewStoredMessage {
    pub unique_id: String,
    pub ciphertext: String,
    /// bcrypt hash, empty when the sender set no passphrase
    pub passphrase_hash: String,
    pub max_view_count: i32,
    /// Empty unless a notification was requested
    pub recipient_email: String,
    pub expires_at: DateTime<Utc>,
}

/// Message row as returned by Storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub ciphertext: String,
    pub passphrase_hash: String,
    pub view_count: i32,
    pub max_view_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredMessage {
    pub fn requires_passphrase(&self) -> bool {
        !self.passphrase_hash.is_empty()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn insert(&self, message: NewStoredMessage) -> ServiceResult<()>;

    /// Consume one view and return the post-increment row
    async fn select(&self, unique_id: &str) -> ServiceResult<StoredMessage>;

    /// Read the row without consuming a view
    async fn get_message(&self, unique_id: &str) -> ServiceResult<StoredMessage>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncryptionApi: Send + Sync {
    /// Fresh random key material of `length` bytes
    async fn generate_key(&self, length: i32) -> ServiceResult<Vec<u8>>;

    async fn encrypt(&self, plaintexts: Vec<String>, key: &[u8]) -> ServiceResult<Vec<String>>;

    /// Returns URL-safe base64 of each plaintext
    async fn decrypt(&self, ciphertexts: Vec<String>, key: &[u8]) -> ServiceResult<Vec<String>>;

    async fn generate_id(&self) -> ServiceResult<String>;
}
