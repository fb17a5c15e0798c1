//! Header injection guards for values that end up in SMTP headers.

use thiserror::Error;

/// Control bytes that must never appear in a header value
const FORBIDDEN_CONTROLS: [char; 6] = ['\r', '\n', '\t', '\u{0B}', '\u{0C}', '\u{08}'];

/// Prefixes that would make a value look like another header
const HEADER_LIKE_PREFIXES: [&str; 12] = [
    "bcc:",
    "cc:",
    "to:",
    "from:",
    "reply-to:",
    "return-path:",
    "x-",
    "content-",
    "mime-",
    "message-id:",
    "date:",
    "received:",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("email header injection detected: CRLF characters found")]
    LineBreak,
    #[error("email header injection detected: control character found")]
    ControlCharacter,
    #[error("email header injection detected: header-like prefix {0:?}")]
    HeaderLikePrefix(&'static str),
}

/// Reject values that could smuggle extra headers
pub fn validate_header_value(value: &str) -> Result<(), HeaderError> {
    if value.contains(['\r', '\n']) {
        return Err(HeaderError::LineBreak);
    }
    if value.contains(&FORBIDDEN_CONTROLS[2..]) {
        return Err(HeaderError::ControlCharacter);
    }

    let lower = value.trim_start().to_lowercase();
    if let Some(prefix) = HEADER_LIKE_PREFIXES.iter().find(|p| lower.starts_with(**p)) {
        return Err(HeaderError::HeaderLikePrefix(*prefix));
    }

    Ok(())
}

/// Strip control bytes; tabs become spaces
pub fn sanitize_header_value(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| match c {
            '\t' => Some(' '),
            c if FORBIDDEN_CONTROLS.contains(&c) => None,
            c => Some(c),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_crlf_injection_rejected() {
        assert_eq!(
            validate_header_value("Alice\r\nBcc: attacker@evil.com"),
            Err(HeaderError::LineBreak)
        );
        assert_eq!(validate_header_value("Alice\nBcc: x"), Err(HeaderError::LineBreak));
    }

    #[test]
    fn test_control_characters_rejected() {
        for value in ["a\tb", "a\u{0B}b", "a\u{0C}b", "a\u{08}b"] {
            assert_eq!(validate_header_value(value), Err(HeaderError::ControlCharacter));
        }
    }

    #[test]
    fn test_header_like_prefix_rejected() {
        assert_eq!(
            validate_header_value("BCC: someone@example.com"),
            Err(HeaderError::HeaderLikePrefix("bcc:"))
        );
        assert_eq!(
            validate_header_value("X-Mailer: evil"),
            Err(HeaderError::HeaderLikePrefix("x-"))
        );
        assert!(validate_header_value("Company: Product").is_ok());
        assert!(validate_header_value("Alice Smith").is_ok());
    }

    #[test]
    fn test_sanitize_strips_controls() {
        assert_eq!(sanitize_header_value("Alice\r\nBcc:\tx"), "AliceBcc: x");
        assert_eq!(sanitize_header_value("plain"), "plain");
    }

    proptest! {
        #[test]
        fn sanitized_values_never_contain_line_breaks(value in any::<String>()) {
            let clean = sanitize_header_value(&value);
            prop_assert!(!clean.contains('\r'));
            prop_assert!(!clean.contains('\n'));
        }

        #[test]
        fn values_with_line_breaks_never_validate(
            head in "[a-zA-Z ]{0,20}",
            brk in prop::sample::select(vec!["\r", "\n", "\r\n"]),
            tail in "[a-zA-Z: ]{0,20}",
        ) {
            let value = format!("{}{}{}", head, brk, tail);
            prop_assert!(validate_header_value(&value).is_err());
        }
    }
}
