//! Unified error taxonomy for Password Exchange services
//!
//! Every service speaks the same closed set of error kinds. Storage and
//! Encryption raise them as gRPC statuses, the Frontend turns them back
//! into [`ServiceError`] with [`ServiceError::from_status`] and finally into
//! an HTTP status at the REST boundary.
//!
//! `NotFound` deliberately carries no detail: an absent, consumed and expired
//! message must be indistinguishable to callers.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tonic::{Code, Status};

pub mod http;

pub use http::StandardErrorResponse;

/// Stable error kinds shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InvalidPassphrase,
    InvalidKeyFormat,
    RateLimited,
    AlreadyExists,
    Transient,
    Internal,
}

/// Core service error used across all Password Exchange services
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input failed validation before any side effect
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        /// Field-level errors keyed by dotted field path, e.g. `sender.email`
        details: BTreeMap<String, String>,
    },

    /// Message absent, consumed or expired
    #[error("Message not found")]
    NotFound,

    /// Passphrase did not match the stored hash
    #[error("Invalid passphrase")]
    InvalidPassphrase,

    /// Decryption key was not valid URL-safe base64 or had the wrong length
    #[error("Invalid key format")]
    InvalidKeyFormat,

    #[error("Rate limit exceeded")]
    RateLimited { limit: u32, window_seconds: u32 },

    /// Unique constraint violation
    #[error("Already exists: {message}")]
    AlreadyExists { message: String },

    /// Retryable remote failure (network, timeout, open circuit)
    #[error("{service} unavailable: {message}")]
    Transient { service: String, message: String },

    /// Internal server error (catch-all)
    #[error("Internal server error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn invalid_with_details(
        message: impl Into<String>,
        details: BTreeMap<String, String>,
    ) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            details,
        }
    }

    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create internal error from any error type
    pub fn internal<E: Into<anyhow::Error>>(error: E) -> Self {
        Self::Internal {
            source: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound => ErrorKind::NotFound,
            Self::InvalidPassphrase => ErrorKind::InvalidPassphrase,
            Self::InvalidKeyFormat => ErrorKind::InvalidKeyFormat,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// HTTP status code used at the REST boundary
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidArgument { .. } | Self::InvalidKeyFormat => 400,
            Self::InvalidPassphrase => 401,
            Self::NotFound => 404,
            Self::RateLimited { .. } => 429,
            Self::Transient { .. } => 503,
            // an ID collision is a server-side failure from the caller's view
            Self::AlreadyExists { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Convert to gRPC Status for service boundaries
    pub fn to_status(&self) -> Status {
        match self {
            Self::InvalidArgument { message, .. } => Status::invalid_argument(message),
            Self::NotFound => Status::not_found("message not found"),
            Self::InvalidPassphrase => Status::unauthenticated("invalid passphrase"),
            Self::InvalidKeyFormat => Status::invalid_argument("invalid key format"),
            Self::RateLimited { .. } => Status::resource_exhausted("rate limit exceeded"),
            Self::AlreadyExists { message } => Status::already_exists(message),
            Self::Transient { service, .. } => {
                Status::unavailable(format!("{} is unavailable", service))
            }
            // Don't expose internals to clients
            Self::Internal { .. } => Status::internal("internal server error"),
        }
    }

    /// Map a status returned by a downstream service named `service`.
    pub fn from_status(service: &str, status: Status) -> Self {
        match status.code() {
            Code::InvalidArgument => Self::invalid(status.message()),
            Code::NotFound => Self::NotFound,
            Code::Unauthenticated => Self::InvalidPassphrase,
            Code::AlreadyExists => Self::AlreadyExists {
                message: status.message().to_string(),
            },
            Code::ResourceExhausted => Self::RateLimited {
                limit: 0,
                window_seconds: 0,
            },
            Code::Unavailable | Code::DeadlineExceeded | Code::Aborted | Code::Cancelled => {
                Self::transient(service, status.message())
            }
            _ => Self::internal(anyhow::anyhow!("{} returned {}", service, status)),
        }
    }

    /// Log error with appropriate level and context
    pub fn log(&self) {
        match self {
            Self::InvalidArgument { .. }
            | Self::NotFound
            | Self::InvalidKeyFormat
            | Self::AlreadyExists { .. } => {
                tracing::debug!(error = %self, "Client error");
            }
            Self::InvalidPassphrase => {
                tracing::warn!(error = %self, "Passphrase mismatch");
            }
            Self::RateLimited { .. } => {
                tracing::info!(error = %self, "Rate limit hit");
            }
            Self::Transient { .. } => {
                tracing::warn!(error = %self, "Dependency issue");
            }
            Self::Internal { source } => {
                tracing::error!(error = %self, cause = %source, "Server error");
            }
        }
    }
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        err.to_status()
    }
}

/// Result type alias for Service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error context extension trait for adding context to Results
pub trait ErrorContext<T> {
    fn context<C>(self, context: C) -> ServiceResult<T>
    where
        C: fmt::Display + Send + Sync + 'static;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> ServiceResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| ServiceError::internal(anyhow::anyhow!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_carries_no_detail() {
        let status = ServiceError::NotFound.to_status();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "message not found");
    }

    #[test]
    fn test_status_round_trip_keeps_kind() {
        let cases = [
            ServiceError::invalid("bad"),
            ServiceError::NotFound,
            ServiceError::InvalidPassphrase,
            ServiceError::AlreadyExists {
                message: "dup".into(),
            },
            ServiceError::transient("storage", "down"),
        ];

        for err in cases {
            let kind = err.kind();
            let back = ServiceError::from_status("storage", err.to_status());
            assert_eq!(back.kind(), kind, "kind changed for {:?}", kind);
        }
    }

    #[test]
    fn test_deadline_exceeded_is_transient() {
        let err = ServiceError::from_status("encryption", Status::deadline_exceeded("slow"));
        assert!(err.is_transient());
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ServiceError::invalid("x").http_status(), 400);
        assert_eq!(ServiceError::InvalidPassphrase.http_status(), 401);
        assert_eq!(ServiceError::NotFound.http_status(), 404);
        assert_eq!(
            ServiceError::RateLimited {
                limit: 10,
                window_seconds: 3600
            }
            .http_status(),
            429
        );
        assert_eq!(ServiceError::internal(anyhow::anyhow!("boom")).http_status(), 500);
    }

    #[test]
    fn test_error_context() {
        fn failing_operation() -> Result<(), std::io::Error> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"))
        }

        let result: ServiceResult<()> = failing_operation().context("Failed to load template");
        assert!(matches!(result, Err(ServiceError::Internal { .. })));
    }
}
