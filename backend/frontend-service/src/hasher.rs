//! bcrypt passphrase hashing off the async executor

use error_types::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy)]
pub struct PassphraseHasher {
    cost: u32,
}

impl PassphraseHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, passphrase: &str) -> ServiceResult<String> {
        let passphrase = passphrase.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(passphrase, cost))
            .await
            .map_err(ServiceError::internal)?
            .map_err(ServiceError::internal)
    }

    /// `Ok(false)` on mismatch; a malformed stored hash is an internal error
    pub async fn verify(&self, passphrase: &str, hash: &str) -> ServiceResult<bool> {
        let passphrase = passphrase.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(passphrase, &hash))
            .await
            .map_err(ServiceError::internal)?
            .map_err(ServiceError::internal)
    }
}
