use error_types::ServiceError;
use thiserror::Error;
use tonic::Status;

pub type Result<T> = std::result::Result<T, EncryptionError>;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("random length must be between 1 and 4096, got {0}")]
    InvalidRandomLength(i32),

    #[error("ciphertext is not valid base64")]
    InvalidBase64,

    #[error("ciphertext too short: {0} bytes")]
    CiphertextTooShort(usize),

    /// Wrong key or tampered ciphertext; deliberately carries no detail
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

impl From<EncryptionError> for ServiceError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::EncryptionFailed => {
                ServiceError::internal(anyhow::anyhow!("AES-GCM seal failed"))
            }
            other => ServiceError::invalid(other.to_string()),
        }
    }
}

impl From<EncryptionError> for Status {
    fn from(err: EncryptionError) -> Self {
        let err = ServiceError::from(err);
        err.log();
        err.to_status()
    }
}
