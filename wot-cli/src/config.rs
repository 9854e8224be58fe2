//! Config file
//!
//! Optional TOML file; command-line flags and environment variables win.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use wot_explorer::ExplorerConfig;
use wot_relay::RelayConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the trust provider bridge
    pub provider_url: Option<String>,
    /// Directory of the file-backed cache
    pub cache_dir: PathBuf,
    pub relay: RelayConfig,
    pub explorer: ExplorerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_url: None,
            cache_dir: PathBuf::from(".wot-cache"),
            relay: RelayConfig::default(),
            explorer: ExplorerConfig::default(),
        }
    }
}

impl Config {
    /// Read `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
