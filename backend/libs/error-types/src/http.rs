//! HTTP error response handling
//!
//! Provides the JSON error body returned by the REST API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// Standard HTTP error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardErrorResponse {
    /// Stable error code for client handling
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Field-level validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,

    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Request path that produced the error
    pub path: String,
}

impl StandardErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now(),
            path: path.into(),
        }
    }

    pub fn with_details(mut self, details: BTreeMap<String, String>) -> Self {
        if !details.is_empty() {
            self.details = Some(details);
        }
        self
    }

    /// Build the response body for `err` raised while serving `path`.
    pub fn from_error(err: &ServiceError, path: impl Into<String>) -> Self {
        match err {
            ServiceError::InvalidArgument { message, details } => {
                Self::new(error_code(err), message.clone(), path).with_details(details.clone())
            }
            _ => Self::new(error_code(err), public_message(err), path),
        }
    }
}

/// Stable error code for an error kind
pub fn error_code(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::InvalidArgument { .. } => "validation_failed",
        ServiceError::NotFound => "message_not_found",
        ServiceError::InvalidPassphrase => "invalid_passphrase",
        ServiceError::InvalidKeyFormat => "invalid_key_format",
        ServiceError::RateLimited { .. } => "rate_limit_exceeded",
        ServiceError::Transient { .. } => "service_unavailable",
        ServiceError::AlreadyExists { .. } | ServiceError::Internal { .. } => "internal_error",
    }
}

fn public_message(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::InvalidArgument { .. } => "The request failed validation",
        ServiceError::NotFound => "Message not found, already consumed or expired",
        ServiceError::InvalidPassphrase => "The passphrase provided is incorrect",
        ServiceError::InvalidKeyFormat => "The decryption key is not valid",
        ServiceError::RateLimited { .. } => "Rate limit exceeded. Please try again later.",
        ServiceError::Transient { .. } => "A required service is temporarily unavailable",
        ServiceError::AlreadyExists { .. } | ServiceError::Internal { .. } => {
            "An internal error occurred"
        }
    }
}
