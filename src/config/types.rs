// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use crate::typewriter::Cadence;

use super::error::ConfigError;

/// Default upstream agent platform.
pub const DEFAULT_AGENT_BASE_URL: &str = "https://api.dify.ai";
/// Default relay port. The relay always binds to localhost.
pub const DEFAULT_RELAY_PORT: u16 = 9810;
/// Default truncation for upstream error details on chat requests.
pub const DEFAULT_MAX_DETAIL_CHARS: usize = 1000;
/// User id forwarded upstream when a request carries none.
pub const DEFAULT_RELAY_USER: &str = "web-user";
/// Where the terminal client persists its state.
pub const DEFAULT_STORAGE_PATH: &str = ".evchat/state.json";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Parsed and validated evchat config.
#[derive(Debug, Clone)]
pub struct Config {
    /// Config version. Always "v1".
    pub version: String,
    /// Upstream agent; only the relay needs it.
    pub agent: Option<AgentConfig>,
    pub relay: RelayConfig,
    pub client: ClientConfig,
    pub typewriter: Cadence,
    pub storage: StorageConfig,
    /// SHA256 of the raw YAML: "sha256:{hex}".
    pub config_hash: String,
}

impl Config {
    /// The agent section, or an error naming what is missing.
    pub fn require_agent(&self) -> Result<&AgentConfig, ConfigError> {
        self.agent.as_ref().ok_or(ConfigError::MissingAgent)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            agent: None,
            relay: RelayConfig::default(),
            client: ClientConfig::default(),
            typewriter: Cadence::default(),
            storage: StorageConfig::default(),
            config_hash: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Upstream agent platform credentials.
#[derive(Clone)]
pub struct AgentConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    pub timeout: Option<Duration>,
}

// Keeps the API key out of logs.
impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
    pub max_detail_chars: usize,
    pub default_user: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_RELAY_PORT,
            max_detail_chars: DEFAULT_MAX_DETAIL_CHARS,
            default_user: DEFAULT_RELAY_USER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the relay the chat client talks to.
    pub relay_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: format!("http://127.0.0.1:{DEFAULT_RELAY_PORT}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORAGE_PATH),
        }
    }
}
