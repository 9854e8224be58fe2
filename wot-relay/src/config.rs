//! Relay configuration and errors

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Relay fan-out configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay endpoints queried in parallel
    pub relays: Vec<String>,
    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Budget for profile and list lookups in milliseconds
    pub profile_timeout_ms: u64,
    /// Budget for feed pages in milliseconds
    pub feed_timeout_ms: u64,
    /// Items requested per feed page
    pub page_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect(),
            connect_timeout_ms: 2_000,
            profile_timeout_ms: 3_000,
            feed_timeout_ms: 10_000,
            page_size: 20,
        }
    }
}

impl RelayConfig {
    pub fn with_relays<I, S>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relays = relays.into_iter().map(Into::into).collect();
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn profile_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_timeout_ms)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_timeout_ms)
    }
}

/// Public relays used when none are configured
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
    "wss://relay.primal.net",
];

/// Errors from relay networking
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),
}

impl RelayError {
    /// Malformed frames are dropped individually; everything else ends the connection
    pub fn is_malformed(&self) -> bool {
        matches!(self, RelayError::Malformed(_))
    }
}

/// Check that a relay URL uses a websocket scheme
pub fn validate_relay_url(url: &str) -> Result<(), RelayError> {
    let lower = url.trim().to_lowercase();
    if (lower.starts_with("wss://") || lower.starts_with("ws://")) && lower.len() > 6 {
        Ok(())
    } else {
        Err(RelayError::InvalidUrl(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert!(!config.relays.is_empty());
        assert_eq!(config.profile_timeout(), Duration::from_secs(3));
        assert_eq!(config.feed_timeout(), Duration::from_secs(10));
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn test_validate_relay_url() {
        assert!(validate_relay_url("wss://relay.damus.io").is_ok());
        assert!(validate_relay_url("ws://localhost:7777").is_ok());
        assert!(validate_relay_url("https://relay.damus.io").is_err());
        assert!(validate_relay_url("wss://").is_err());
    }
}
