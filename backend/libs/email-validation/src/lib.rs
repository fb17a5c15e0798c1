//! Email address and header value checks shared by the Frontend and
//! Notification services.
//!
//! - [`validate_email`] decides whether an address may be stored or mailed.
//! - [`mask_email_for_logging`] is the only form in which addresses reach logs.
//! - [`validate_header_value`] and [`sanitize_header_value`] guard every header
//!   built from untrusted input.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

mod header;

pub use header::{sanitize_header_value, validate_header_value, HeaderError};

/// RFC 5321 upper bound for a full address
pub const MAX_EMAIL_LENGTH: usize = 320;

/// Letters-only TLD of any length, so `a@b.c` passes
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]+$")
        .expect("Invalid email regex pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("email address cannot be empty")]
    Empty,
    #[error("email too long ({0} chars, max {MAX_EMAIL_LENGTH})")]
    TooLong(usize),
    #[error("invalid email address format: {0}")]
    Invalid(&'static str),
}

/// Lowercase and trim an address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), EmailError> {
    if email.trim().is_empty() {
        return Err(EmailError::Empty);
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(EmailError::TooLong(email.len()));
    }

    let normalized = normalize_email(email);
    if !EMAIL_REGEX.is_match(&normalized) {
        return Err(EmailError::Invalid("does not match expected pattern"));
    }
    if normalized.contains("..") {
        return Err(EmailError::Invalid("contains consecutive dots"));
    }

    let (local, domain) = normalized
        .split_once('@')
        .ok_or(EmailError::Invalid("invalid email structure"))?;
    if local.starts_with('.') || local.ends_with('.') {
        return Err(EmailError::Invalid("local part cannot start or end with dot"));
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(EmailError::Invalid("domain cannot start or end with dot"));
    }

    Ok(())
}

pub fn is_valid_email(email: &str) -> bool {
    validate_email(email).is_ok()
}

/// Mask an address for logging: `a***z@domain`
pub fn mask_email_for_logging(email: &str) -> String {
    if email.is_empty() {
        return "[EMPTY_EMAIL]".to_string();
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return "[INVALID_EMAIL_FORMAT]".to_string();
    };

    let chars: Vec<char> = local.chars().collect();
    match chars.len() {
        0 | 1 => format!("{}***@{}", local, domain),
        2 | 3 => format!("{}**@{}", chars[0], domain),
        n => format!("{}***{}@{}", chars[0], chars[n - 1], domain),
    }
}
