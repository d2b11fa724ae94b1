// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads evchat.yaml, validates structure, resolves variable interpolation,
// applies defaults, and computes a deterministic config hash for startup
// logs.

mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::{env_lookup, resolve_variables};
pub use loader::{load_config, load_config_with};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;
