//! Identity keys
//!
//! Participants are identified by 32-byte public keys in lowercase hex.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors from identity key parsing
#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("Invalid identity key: {0}")]
    InvalidKey(String),
}

fn key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-f]{64}$").expect("static regex"))
}

/// Check whether a string is a well-formed identity key
pub fn is_identity_key(s: &str) -> bool {
    key_regex().is_match(s)
}

/// Normalize user input (whitespace, case) into an identity key
pub fn parse_identity_key(input: &str) -> Result<String, IdentityError> {
    let key = input.trim().to_lowercase();
    if is_identity_key(&key) {
        Ok(key)
    } else {
        Err(IdentityError::InvalidKey(input.to_string()))
    }
}

/// Shortened form used as a fallback label
pub fn short_key(key: &str) -> String {
    if key.len() > 12 {
        format!("{}…{}", &key[..8], &key[key.len() - 4..])
    } else {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity_key() {
        let key = "A".repeat(64);
        assert_eq!(parse_identity_key(&format!("  {} ", key)).unwrap(), "a".repeat(64));
        assert!(parse_identity_key("npub1xyz").is_err());
        assert!(parse_identity_key(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_short_key() {
        let key = format!("{}{}", "ab".repeat(30), "cdef");
        assert_eq!(short_key(&key), "abababab…cdef");
        assert_eq!(short_key("abc"), "abc");
    }
}
