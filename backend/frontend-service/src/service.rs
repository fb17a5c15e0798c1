//! Message lifecycle engine
//!
//! Submit: validate, key, encrypt, id, hash, store, then best-effort queue
//! the notification. Retrieve: peek, check the passphrase, and only then
//! consume a view and decrypt.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use email_validation::{mask_email_for_logging, validate_email, validate_header_value};
use error_types::{ServiceError, ServiceResult};
use message_queue::{EnvelopePublisher, NotificationEnvelope, TemplateKind};
use tracing::{debug, error, info, warn};

use crate::anti_spam;
use crate::clients::{EncryptionApi, NewStoredMessage, StorageApi};
use crate::config::{MessageSettings, DEFAULT_EXPIRATION_HOURS};
use crate::hasher::PassphraseHasher;
use crate::metrics::{record_retrieval, MESSAGES_SUBMITTED_TOTAL, NOTIFICATION_PUBLISH_FAILURES_TOTAL};
use crate::turnstile::HumanVerifier;

pub const KEY_LENGTH: usize = 32;
pub const MAX_CONTENT_CHARS: usize = 10_000;
pub const MAX_PASSPHRASE_CHARS: usize = 500;
pub const MAX_NAME_CHARS: usize = 100;

const NOTIFICATION_BODY: &str = "Please click the link below to get your encrypted message";

/// Everything a sender can set, already unpacked from JSON or form input
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub content: String,
    pub sender_name: String,
    pub sender_email: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub passphrase: String,
    pub additional_info: String,
    pub send_notification: bool,
    pub anti_spam_answer: String,
    pub question_id: Option<i32>,
    /// 0 selects the configured default
    pub max_view_count: i32,
    /// 0 selects the default lifetime
    pub expiration_hours: i64,
    pub turnstile_token: String,
    pub remote_ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub message_id: String,
    pub decrypt_url: String,
    /// URL-safe base64 of the key; returned once, never stored
    pub key_b64: String,
    pub expires_at: DateTime<Utc>,
    pub notification_queued: bool,
}

#[derive(Debug, Clone)]
pub struct AccessInfo {
    pub message_id: String,
    pub requires_passphrase: bool,
    pub has_been_accessed: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub message_id: String,
    pub key: Vec<u8>,
    pub passphrase: String,
}

#[derive(Debug, Clone)]
pub struct RetrievedMessage {
    pub message_id: String,
    pub content: String,
    pub view_count: i32,
    pub max_view_count: i32,
}

/// Decode a key taken from a URL or request body
pub fn decode_key(raw: &str) -> ServiceResult<Vec<u8>> {
    let raw = raw.trim().trim_start_matches('/');
    let key = URL_SAFE
        .decode(raw)
        .or_else(|_| URL_SAFE_NO_PAD.decode(raw))
        .map_err(|_| ServiceError::InvalidKeyFormat)?;
    if key.len() != KEY_LENGTH {
        return Err(ServiceError::InvalidKeyFormat);
    }
    Ok(key)
}

pub struct MessageService {
    storage: Arc<dyn StorageApi>,
    encryption: Arc<dyn EncryptionApi>,
    publisher: Option<Arc<dyn EnvelopePublisher>>,
    verifier: Option<Arc<dyn HumanVerifier>>,
    hasher: PassphraseHasher,
    base_url: String,
    settings: MessageSettings,
}

impl MessageService {
    pub fn new(
        storage: Arc<dyn StorageApi>,
        encryption: Arc<dyn EncryptionApi>,
        base_url: impl Into<String>,
        settings: MessageSettings,
    ) -> Self {
        Self {
            storage,
            encryption,
            publisher: None,
            verifier: None,
            hasher: PassphraseHasher::new(settings.bcrypt_cost),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settings,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EnvelopePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn HumanVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn notifications_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    pub fn max_expiration_hours(&self) -> i64 {
        self.settings.max_expiration_hours
    }

    pub async fn submit(&self, req: SubmitRequest) -> ServiceResult<SubmitResult> {
        info!(
            sender = %mask_email_for_logging(&req.sender_email),
            notify = req.send_notification,
            "Processing message submission"
        );

        self.validate(&req)?;
        if req.send_notification {
            self.verify_human(&req).await?;
        }

        let key = self.encryption.generate_key(KEY_LENGTH as i32).await?;
        let ciphertext = self
            .encryption
            .encrypt(vec![req.content.clone()], &key)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::internal(anyhow::anyhow!("encryption returned no ciphertext")))?;
        let message_id = self.encryption.generate_id().await?;

        let passphrase_hash = if req.passphrase.trim().is_empty() {
            String::new()
        } else {
            self.hasher.hash(&req.passphrase).await?
        };

        let key_b64 = URL_SAFE.encode(&key);
        let decrypt_url = format!("{}/decrypt/{}/{}", self.base_url, message_id, key_b64);

        let hours = if req.expiration_hours == 0 {
            DEFAULT_EXPIRATION_HOURS
        } else {
            req.expiration_hours
        };
        let expires_at = Utc::now() + Duration::hours(hours);

        let max_view_count = if req.max_view_count == 0 {
            self.settings.default_max_view_count
        } else {
            req.max_view_count
        };

        self.storage
            .insert(NewStoredMessage {
                unique_id: message_id.clone(),
                ciphertext,
                passphrase_hash,
                max_view_count,
                recipient_email: if req.send_notification {
                    req.recipient_email.trim().to_string()
                } else {
                    String::new()
                },
                expires_at,
            })
            .await?;
        MESSAGES_SUBMITTED_TOTAL.inc();

        let notification_queued = if req.send_notification {
            self.queue_notification(&req, &message_id, &decrypt_url).await
        } else {
            false
        };

        info!(message_id = %message_id, max_view_count, "Message submitted successfully");
        Ok(SubmitResult {
            message_id,
            decrypt_url,
            key_b64,
            expires_at,
            notification_queued,
        })
    }

    /// Peek at a message; never consumes a view
    pub async fn check_access(&self, message_id: &str) -> ServiceResult<AccessInfo> {
        let row = self.storage.get_message(message_id).await?;
        debug!(
            message_id,
            requires_passphrase = row.requires_passphrase(),
            "Message access checked"
        );
        Ok(AccessInfo {
            message_id: message_id.to_string(),
            requires_passphrase: row.requires_passphrase(),
            has_been_accessed: row.view_count > 0,
            expires_at: row.expires_at,
        })
    }

    pub async fn retrieve(&self, req: RetrieveRequest) -> ServiceResult<RetrievedMessage> {
        let result = self.retrieve_inner(req).await;
        record_retrieval(match &result {
            Ok(_) => "success",
            Err(ServiceError::NotFound) => "not_found",
            Err(ServiceError::InvalidPassphrase) => "invalid_passphrase",
            Err(ServiceError::InvalidKeyFormat) => "invalid_key",
            Err(_) => "error",
        });
        result
    }

    async fn retrieve_inner(&self, req: RetrieveRequest) -> ServiceResult<RetrievedMessage> {
        if req.key.len() != KEY_LENGTH {
            return Err(ServiceError::InvalidKeyFormat);
        }

        let meta = self.storage.get_message(&req.message_id).await?;
        if meta.requires_passphrase()
            && !self
                .hasher
                .verify(&req.passphrase, &meta.passphrase_hash)
                .await?
        {
            warn!(message_id = %req.message_id, "Invalid passphrase provided");
            return Err(ServiceError::InvalidPassphrase);
        }

        // The only step that consumes a view
        let row = self.storage.select(&req.message_id).await?;

        let encoded = self
            .encryption
            .decrypt(vec![row.ciphertext], &req.key)
            .await
            .map_err(|e| match e {
                ServiceError::InvalidArgument { .. } => ServiceError::InvalidKeyFormat,
                other => other,
            })?
            .into_iter()
            .next()
            .unwrap_or_default();

        let bytes = URL_SAFE
            .decode(encoded.as_bytes())
            .map_err(ServiceError::internal)?;
        let content = String::from_utf8(bytes).map_err(ServiceError::internal)?;

        debug!(message_id = %req.message_id, view_count = row.view_count, "Message retrieved");
        Ok(RetrievedMessage {
            message_id: req.message_id,
            content,
            view_count: row.view_count,
            max_view_count: row.max_view_count,
        })
    }

    fn validate(&self, req: &SubmitRequest) -> ServiceResult<()> {
        let mut details = BTreeMap::new();

        if req.content.trim().is_empty() {
            details.insert("content".to_string(), "Message content is required".to_string());
        } else if req.content.chars().count() > MAX_CONTENT_CHARS {
            details.insert(
                "content".to_string(),
                format!("Must be no more than {} characters", MAX_CONTENT_CHARS),
            );
        }

        if req.passphrase.chars().count() > MAX_PASSPHRASE_CHARS {
            details.insert(
                "passphrase".to_string(),
                format!("Must be no more than {} characters", MAX_PASSPHRASE_CHARS),
            );
        }

        if req.max_view_count != 0 && !(1..=100).contains(&req.max_view_count) {
            details.insert(
                "maxViewCount".to_string(),
                "Max view count must be between 1 and 100".to_string(),
            );
        }

        let max_hours = self.settings.max_expiration_hours;
        if req.expiration_hours != 0 && !(1..=max_hours).contains(&req.expiration_hours) {
            details.insert(
                "expirationHours".to_string(),
                format!("Expiration must be between 1 hour and {} days", max_hours / 24),
            );
        }

        if req.send_notification {
            check_name(&mut details, "sender.name", "Sender", &req.sender_name);
            check_email(&mut details, "sender.email", "Sender", &req.sender_email);
            check_name(&mut details, "recipient.name", "Recipient", &req.recipient_name);
            check_email(&mut details, "recipient.email", "Recipient", &req.recipient_email);

            if req.anti_spam_answer.trim().is_empty() {
                details.insert(
                    "antiSpamAnswer".to_string(),
                    "Anti-spam answer is required when notifications are enabled".to_string(),
                );
            } else if !anti_spam::is_valid_answer(req.question_id, &req.anti_spam_answer) {
                details.insert("antiSpamAnswer".to_string(), "Invalid anti-spam answer".to_string());
            }
        }

        if details.is_empty() {
            Ok(())
        } else {
            debug!(fields = ?details.keys().collect::<Vec<_>>(), "Submission failed validation");
            Err(ServiceError::invalid_with_details("Request validation failed", details))
        }
    }

    async fn verify_human(&self, req: &SubmitRequest) -> ServiceResult<()> {
        let Some(verifier) = &self.verifier else {
            return Ok(());
        };

        if verifier
            .verify(&req.turnstile_token, req.remote_ip.clone())
            .await?
        {
            return Ok(());
        }

        let mut details = BTreeMap::new();
        details.insert(
            "turnstileToken".to_string(),
            "Human verification failed".to_string(),
        );
        Err(ServiceError::invalid_with_details("Request validation failed", details))
    }

    /// Publish failures are logged and swallowed; the message is already stored
    async fn queue_notification(&self, req: &SubmitRequest, message_id: &str, url: &str) -> bool {
        let Some(publisher) = &self.publisher else {
            warn!(message_id, "Notification requested but no publisher is configured");
            return false;
        };

        let envelope = NotificationEnvelope {
            sender_email: req.sender_email.trim().to_string(),
            sender_name: req.sender_name.trim().to_string(),
            recipient_name: req.recipient_name.trim().to_string(),
            recipient_email: req.recipient_email.trim().to_string(),
            unique_id: message_id.to_string(),
            content: NOTIFICATION_BODY.to_string(),
            url: url.to_string(),
            additional_info: req.additional_info.clone(),
            subject: format!(
                "Encrypted Message from Password Exchange from {}",
                req.sender_name.trim()
            ),
            ..Default::default()
        }
        .with_kind(TemplateKind::Initial);

        match publisher.publish(&envelope).await {
            Ok(()) => true,
            Err(e) => {
                NOTIFICATION_PUBLISH_FAILURES_TOTAL.inc();
                error!(
                    message_id,
                    recipient = %mask_email_for_logging(&envelope.recipient_email),
                    error = %e,
                    "Failed to queue notification"
                );
                false
            }
        }
    }
}

fn check_name(details: &mut BTreeMap<String, String>, field: &str, who: &str, value: &str) {
    let value = value.trim();
    let problem = if value.is_empty() {
        format!("{} name is required when notifications are enabled", who)
    } else if value.chars().count() > MAX_NAME_CHARS {
        format!("Must be no more than {} characters", MAX_NAME_CHARS)
    } else if validate_header_value(value).is_err() {
        "Contains characters that are not allowed".to_string()
    } else {
        return;
    };
    details.insert(field.to_string(), problem);
}

fn check_email(details: &mut BTreeMap<String, String>, field: &str, who: &str, value: &str) {
    let problem = if value.trim().is_empty() {
        format!("{} email is required when notifications are enabled", who)
    } else if validate_email(value).is_err() {
        "Must be a valid email address".to_string()
    } else {
        return;
    };
    details.insert(field.to_string(), problem);
}
