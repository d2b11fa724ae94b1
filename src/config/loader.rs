// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::typewriter::Cadence;

use super::error::ConfigError;
use super::interpolation::{env_lookup, resolve_variables};
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate an evchat config, resolving `${VAR}` from the
/// process environment.
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    load_config_with(source, &env_lookup)
}

/// Load and validate an evchat config with an explicit variable lookup.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate the version key
/// 5. Resolve variable interpolation in string fields
/// 6. Apply defaults and validate each section
pub fn load_config_with(
    source: &dyn ConfigSource,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.evchat != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.evchat
        )));
    }

    let agent = raw
        .agent
        .map(|a| build_agent_config(a, lookup))
        .transpose()?;
    let relay = build_relay_config(raw.relay)?;
    let client = build_client_config(raw.client, lookup)?;
    let typewriter = build_cadence(raw.typewriter)?;
    let storage = build_storage_config(raw.storage, lookup)?;

    Ok(Config {
        version: raw.evchat,
        agent,
        relay,
        client,
        typewriter,
        storage,
        config_hash,
    })
}

fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_agent_config(
    raw: raw::RawAgentConfig,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<AgentConfig, ConfigError> {
    let base_url = match raw.base_url {
        Some(url) => resolve_variables(&url, lookup)?,
        None => DEFAULT_AGENT_BASE_URL.to_string(),
    };
    let base_url = validate_http_url("agent.base_url", &base_url)?;

    let api_key = resolve_variables(&raw.api_key, lookup)?.trim().to_string();
    if api_key.is_empty() {
        return Err(ConfigError::Validation(
            "agent.api_key must not be empty".to_string(),
        ));
    }

    let timeout = match raw.timeout_ms {
        Some(0) => {
            return Err(ConfigError::Validation(
                "agent.timeout_ms must be greater than 0".to_string(),
            ))
        }
        Some(ms) => Some(Duration::from_millis(ms)),
        None => None,
    };

    Ok(AgentConfig {
        base_url,
        api_key,
        timeout,
    })
}

fn build_relay_config(raw: Option<raw::RawRelayConfig>) -> Result<RelayConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(RelayConfig::default());
    };
    let defaults = RelayConfig::default();

    let port = raw.port.unwrap_or(defaults.port);
    if port == 0 {
        return Err(ConfigError::Validation(
            "relay.port must be between 1 and 65535".to_string(),
        ));
    }

    let default_user = raw
        .default_user
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or(defaults.default_user);

    Ok(RelayConfig {
        port,
        max_detail_chars: raw.max_detail_chars.unwrap_or(defaults.max_detail_chars),
        default_user,
    })
}

fn build_client_config(
    raw: Option<raw::RawClientConfig>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    match raw.and_then(|c| c.relay_url) {
        Some(url) => {
            let url = resolve_variables(&url, lookup)?;
            Ok(ClientConfig {
                relay_url: validate_http_url("client.relay_url", &url)?,
            })
        }
        None => Ok(ClientConfig::default()),
    }
}

fn build_cadence(raw: Option<raw::RawTypewriterConfig>) -> Result<Cadence, ConfigError> {
    let defaults = Cadence::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let interval = match raw.interval_ms {
        Some(0) => {
            return Err(ConfigError::Validation(
                "typewriter.interval_ms must be greater than 0".to_string(),
            ))
        }
        Some(ms) => Duration::from_millis(ms),
        None => defaults.interval,
    };

    let chunk_chars = match raw.chunk_chars {
        Some(0) => {
            return Err(ConfigError::Validation(
                "typewriter.chunk_chars must be greater than 0".to_string(),
            ))
        }
        Some(n) => n,
        None => defaults.chunk_chars,
    };

    Ok(Cadence {
        interval,
        chunk_chars,
    })
}

fn build_storage_config(
    raw: Option<raw::RawStorageConfig>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<StorageConfig, ConfigError> {
    match raw.and_then(|s| s.path) {
        Some(path) => Ok(StorageConfig {
            path: PathBuf::from(resolve_variables(&path, lookup)?),
        }),
        None => Ok(StorageConfig::default()),
    }
}

/// Require an http(s) URL and strip trailing slashes.
fn validate_http_url(field: &str, url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "{field} must be an http:// or https:// URL, got \"{url}\""
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}
