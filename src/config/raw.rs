// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
//
// Kept apart from the public Config structs because interpolation,
// defaulting, and validation happen between the two.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub evchat: String,
    pub agent: Option<RawAgentConfig>,
    pub relay: Option<RawRelayConfig>,
    pub client: Option<RawClientConfig>,
    pub typewriter: Option<RawTypewriterConfig>,
    pub storage: Option<RawStorageConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawAgentConfig {
    pub base_url: Option<String>,
    pub api_key: String,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRelayConfig {
    pub port: Option<u16>,
    pub max_detail_chars: Option<usize>,
    pub default_user: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawClientConfig {
    pub relay_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTypewriterConfig {
    pub interval_ms: Option<u64>,
    pub chunk_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStorageConfig {
    pub path: Option<String>,
}
