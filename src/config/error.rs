// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

/// All errors that can occur during config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config source: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("undefined variable ${{{name}}} in config (not set in environment)")]
    UndefinedVariable { name: String },

    #[error("config has no `agent` section; the relay needs the agent base URL and API key")]
    MissingAgent,
}
