use std::time::Duration;

use actix_middleware::{current_correlation_id, GRPC_CORRELATION_ID_KEY};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use error_types::{ServiceError, ServiceResult};
use tonic::metadata::MetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::debug;

use super::{EncryptionApi, NewStoredMessage, StorageApi, StoredMessage};
use crate::pb::encryption::{
    encryption_service_client::EncryptionServiceClient, DecryptedMessageRequest,
    EncryptedMessageRequest, GenerateIdRequest, RandomRequest,
};
use crate::pb::storage::{db_service_client::DbServiceClient, InsertRequest, SelectRequest, SelectResponse};

const STORAGE: &str = "storage";
const ENCRYPTION: &str = "encryption";

/// Client interceptor: copy the current request's correlation ID into
/// outbound metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationForwarder;

impl Interceptor for CorrelationForwarder {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        if let Some(id) = current_correlation_id() {
            if let Ok(value) = MetadataValue::try_from(id.as_str()) {
                req.metadata_mut().insert(GRPC_CORRELATION_ID_KEY, value);
            }
        }
        Ok(req)
    }
}

/// Lazily connected channel; the first call dials
pub fn connect_channel(
    url: &str,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Channel, tonic::transport::Error> {
    Ok(Endpoint::from_shared(url.to_string())?
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .connect_lazy())
}

type Intercepted = InterceptedService<Channel, CorrelationForwarder>;

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

impl From<SelectResponse> for StoredMessage {
    fn from(row: SelectResponse) -> Self {
        Self {
            ciphertext: row.content,
            passphrase_hash: row.passphrase,
            view_count: row.view_count,
            max_view_count: row.max_view_count,
            expires_at: parse_timestamp(&row.expires_at),
        }
    }
}

#[derive(Clone)]
pub struct GrpcStorageClient {
    client: DbServiceClient<Intercepted>,
    channel: Channel,
}

impl GrpcStorageClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: DbServiceClient::with_interceptor(channel.clone(), CorrelationForwarder),
            channel,
        }
    }

    /// Underlying channel, shared with the health probe
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }
}

#[async_trait]
impl StorageApi for GrpcStorageClient {
    async fn insert(&self, message: NewStoredMessage) -> ServiceResult<()> {
        debug!(message_id = %message.unique_id, "Storage.Insert");
        self.client
            .clone()
            .insert(InsertRequest {
                content: message.ciphertext,
                uuid: message.unique_id,
                passphrase: message.passphrase_hash,
                max_view_count: message.max_view_count,
                recipient_email: message.recipient_email,
                expires_at: message
                    .expires_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            })
            .await
            .map_err(|status| ServiceError::from_status(STORAGE, status))?;
        Ok(())
    }

    async fn select(&self, unique_id: &str) -> ServiceResult<StoredMessage> {
        let response = self
            .client
            .clone()
            .select(SelectRequest {
                uuid: unique_id.to_string(),
            })
            .await
            .map_err(|status| ServiceError::from_status(STORAGE, status))?;
        Ok(response.into_inner().into())
    }

    async fn get_message(&self, unique_id: &str) -> ServiceResult<StoredMessage> {
        let response = self
            .client
            .clone()
            .get_message(SelectRequest {
                uuid: unique_id.to_string(),
            })
            .await
            .map_err(|status| ServiceError::from_status(STORAGE, status))?;
        Ok(response.into_inner().into())
    }
}

#[derive(Clone)]
pub struct GrpcEncryptionClient {
    client: EncryptionServiceClient<Intercepted>,
    channel: Channel,
}

impl GrpcEncryptionClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: EncryptionServiceClient::with_interceptor(channel.clone(), CorrelationForwarder),
            channel,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }
}

#[async_trait]
impl EncryptionApi for GrpcEncryptionClient {
    async fn generate_key(&self, length: i32) -> ServiceResult<Vec<u8>> {
        let response = self
            .client
            .clone()
            .generate_random_string(RandomRequest {
                random_length: length,
            })
            .await
            .map_err(|status| ServiceError::from_status(ENCRYPTION, status))?;
        Ok(response.into_inner().encryption_bytes)
    }

    async fn encrypt(&self, plaintexts: Vec<String>, key: &[u8]) -> ServiceResult<Vec<String>> {
        let response = self
            .client
            .clone()
            .encrypt_message(EncryptedMessageRequest {
                plain_text: plaintexts,
                key: key.to_vec(),
            })
            .await
            .map_err(|status| ServiceError::from_status(ENCRYPTION, status))?;
        Ok(response.into_inner().ciphertext)
    }

    async fn decrypt(&self, ciphertexts: Vec<String>, key: &[u8]) -> ServiceResult<Vec<String>> {
        let response = self
            .client
            .clone()
            .decrypt_message(DecryptedMessageRequest {
                ciphertext: ciphertexts,
                key: key.to_vec(),
            })
            .await
            .map_err(|status| ServiceError::from_status(ENCRYPTION, status))?;
        Ok(response.into_inner().plaintext)
    }

    async fn generate_id(&self) -> ServiceResult<String> {
        let response = self
            .client
            .clone()
            .generate_id(GenerateIdRequest {})
            .await
            .map_err(|status| ServiceError::from_status(ENCRYPTION, status))?;
        Ok(response.into_inner().id)
    }
}
