//! REST request and response bodies (camelCase on the wire)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::{AccessInfo, RetrievedMessage, SubmitRequest, SubmitResult};

pub const API_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSubmissionRequest {
    #[serde(default)]
    pub content: String,
    pub sender: Option<ContactInfo>,
    pub recipient: Option<ContactInfo>,
    pub passphrase: Option<String>,
    pub additional_info: Option<String>,
    #[serde(default)]
    pub send_notification: bool,
    pub anti_spam_answer: Option<String>,
    pub question_id: Option<i32>,
    pub max_view_count: Option<i32>,
    pub expiration_hours: Option<i64>,
    pub turnstile_token: Option<String>,
}

impl MessageSubmissionRequest {
    /// Field errors that only exist in the JSON shape
    pub fn missing_parties(&self) -> BTreeMap<String, String> {
        let mut details = BTreeMap::new();
        if !self.send_notification {
            return details;
        }
        if self.sender.is_none() {
            details.insert(
                "sender".to_string(),
                "Sender information is required when notifications are enabled".to_string(),
            );
        }
        if self.recipient.is_none() {
            details.insert(
                "recipient".to_string(),
                "Recipient information is required when notifications are enabled".to_string(),
            );
        }
        details
    }

    pub fn into_submit(self, remote_ip: Option<String>) -> SubmitRequest {
        let sender = self.sender.unwrap_or_default();
        let recipient = self.recipient.unwrap_or_default();
        SubmitRequest {
            content: self.content,
            sender_name: sender.name,
            sender_email: sender.email,
            recipient_name: recipient.name,
            recipient_email: recipient.email,
            passphrase: self.passphrase.unwrap_or_default(),
            additional_info: self.additional_info.unwrap_or_default(),
            send_notification: self.send_notification,
            anti_spam_answer: self.anti_spam_answer.unwrap_or_default(),
            question_id: self.question_id,
            max_view_count: self.max_view_count.unwrap_or(0),
            expiration_hours: self.expiration_hours.unwrap_or(0),
            turnstile_token: self.turnstile_token.unwrap_or_default(),
            remote_ip,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSubmissionResponse {
    pub message_id: String,
    pub decrypt_url: String,
    pub key: String,
    pub web_url: String,
    pub expires_at: DateTime<Utc>,
    pub notification_sent: bool,
}

impl From<SubmitResult> for MessageSubmissionResponse {
    fn from(result: SubmitResult) -> Self {
        Self {
            message_id: result.message_id,
            web_url: result.decrypt_url.clone(),
            decrypt_url: result.decrypt_url,
            key: result.key_b64,
            expires_at: result.expires_at,
            notification_sent: result.notification_queued,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAccessInfoResponse {
    pub message_id: String,
    pub exists: bool,
    pub requires_passphrase: bool,
    pub has_been_accessed: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<AccessInfo> for MessageAccessInfoResponse {
    fn from(info: AccessInfo) -> Self {
        Self {
            message_id: info.message_id,
            exists: true,
            requires_passphrase: info.requires_passphrase,
            has_been_accessed: info.has_been_accessed,
            expires_at: info.expires_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDecryptRequest {
    pub decryption_key: String,
    pub passphrase: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDecryptResponse {
    pub message_id: String,
    pub content: String,
    pub view_count: i32,
    pub max_view_count: i32,
    pub decrypted_at: DateTime<Utc>,
}

impl From<RetrievedMessage> for MessageDecryptResponse {
    fn from(message: RetrievedMessage) -> Self {
        Self {
            message_id: message.message_id,
            content: message.content,
            view_count: message.view_count,
            max_view_count: message.max_view_count,
            decrypted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthServices {
    pub database: &'static str,
    pub encryption: &'static str,
    pub email: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: HealthServices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_request_parses_camel_case() {
        let req: MessageSubmissionRequest = serde_json::from_str(
            r#"{
                "content": "hi",
                "sender": {"name": "Alice", "email": "alice@example.com"},
                "sendNotification": true,
                "antiSpamAnswer": "blue",
                "maxViewCount": 3
            }"#,
        )
        .unwrap();

        let details = req.missing_parties();
        assert_eq!(details.len(), 1);
        assert!(details.contains_key("recipient"));

        let submit = req.into_submit(None);
        assert_eq!(submit.sender_name, "Alice");
        assert_eq!(submit.max_view_count, 3);
        assert_eq!(submit.expiration_hours, 0);
        assert!(submit.recipient_email.is_empty());
    }

    #[test]
    fn test_submission_response_mirrors_url() {
        let response: MessageSubmissionResponse = SubmitResult {
            message_id: "abc".into(),
            decrypt_url: "https://x/decrypt/abc/key".into(),
            key_b64: "key".into(),
            expires_at: Utc::now(),
            notification_queued: false,
        }
        .into();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["webUrl"], json["decryptUrl"]);
        assert_eq!(json["notificationSent"], false);
    }
}
