//! Explorer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use wot_core::{TrustConfig, MAX_EXPANSION_DISTANCE};

/// Current trust-fact storage format; bump to purge stored trust facts
pub const TRUST_FORMAT_VERSION: u32 = 2;

/// Expansion and cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Nodes at or beyond this distance are not expanded; capped at
    /// `MAX_EXPANSION_DISTANCE`
    pub max_distance: u32,
    /// Budget for each provider call in milliseconds
    pub provider_timeout_ms: u64,
    /// Profile cache TTL in seconds
    pub profile_ttl_secs: i64,
    /// Trust-fact cache TTL in seconds
    pub trust_ttl_secs: i64,
    /// Trust-fact storage format version
    pub trust_format_version: u32,
    /// Also collect mute edges from relays
    pub fetch_mutes: bool,
    /// Trust formula table
    pub trust: TrustConfig,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_distance: MAX_EXPANSION_DISTANCE,
            provider_timeout_ms: 5_000,
            profile_ttl_secs: 24 * 60 * 60,
            trust_ttl_secs: 24 * 60 * 60,
            trust_format_version: TRUST_FORMAT_VERSION,
            fetch_mutes: true,
            trust: TrustConfig::default(),
        }
    }
}

impl ExplorerConfig {
    /// Distance at which expansion stops, never beyond the hard limit
    pub fn expansion_limit(&self) -> u32 {
        self.max_distance.min(MAX_EXPANSION_DISTANCE)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn profile_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.profile_ttl_secs)
    }

    pub fn trust_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.trust_ttl_secs)
    }
}
