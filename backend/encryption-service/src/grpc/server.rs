use tonic::{Request, Response, Status};
use tracing::debug;

use super::correlation_id;
use crate::crypto;
use crate::pb::encryption_service_server::EncryptionService;
use crate::pb::*;

/// Stateless; holds no key material between calls
#[derive(Debug, Clone, Default)]
pub struct EncryptionServiceImpl;

impl EncryptionServiceImpl {
    pub fn new() -> Self {
        Self
    }
}

#[tonic::async_trait]
impl EncryptionService for EncryptionServiceImpl {
    async fn generate_random_string(
        &self,
        request: Request<RandomRequest>,
    ) -> Result<Response<RandomResponse>, Status> {
        let cid = correlation_id(&request);
        let length = request.into_inner().random_length;

        let bytes = crypto::random_bytes(length)?;
        debug!(correlation_id = %cid, length, "Generated random bytes");

        Ok(Response::new(RandomResponse {
            encryption_string: crypto::encode_key(&bytes),
            encryption_bytes: bytes,
        }))
    }

    async fn encrypt_message(
        &self,
        request: Request<EncryptedMessageRequest>,
    ) -> Result<Response<EncryptedMessageResponse>, Status> {
        let cid = correlation_id(&request);
        let req = request.into_inner();

        let ciphertext = crypto::encrypt_batch(req.plain_text.as_slice(), &req.key)?;
        debug!(correlation_id = %cid, count = ciphertext.len(), "Encrypted messages");

        Ok(Response::new(EncryptedMessageResponse { ciphertext }))
    }

    async fn decrypt_message(
        &self,
        request: Request<DecryptedMessageRequest>,
    ) -> Result<Response<DecryptedMessageResponse>, Status> {
        let cid = correlation_id(&request);
        let req = request.into_inner();

        let plaintext = crypto::decrypt_batch(req.ciphertext.as_slice(), &req.key)?;
        debug!(correlation_id = %cid, count = plaintext.len(), "Decrypted messages");

        Ok(Response::new(DecryptedMessageResponse { plaintext }))
    }

    async fn generate_id(
        &self,
        request: Request<GenerateIdRequest>,
    ) -> Result<Response<GenerateIdResponse>, Status> {
        let id = crypto::generate_id();
        debug!(correlation_id = %correlation_id(&request), "Generated message id");
        Ok(Response::new(GenerateIdResponse { id }))
    }
}
