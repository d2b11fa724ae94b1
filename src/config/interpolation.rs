// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Resolves `${VAR_NAME}` references in `input` through `lookup`.
///
/// Returns `ConfigError::UndefinedVariable` if a referenced variable has no
/// value. An unterminated or empty `${` is kept literally.
pub fn resolve_variables(
    input: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }

        chars.next(); // consume '{'
        let mut var_name = String::new();
        let mut found_close = false;
        for c in chars.by_ref() {
            if c == '}' {
                found_close = true;
                break;
            }
            var_name.push(c);
        }

        if !found_close || var_name.is_empty() {
            result.push_str("${");
            result.push_str(&var_name);
            if found_close {
                result.push('}');
            }
            continue;
        }

        let value = lookup(&var_name).ok_or_else(|| ConfigError::UndefinedVariable {
            name: var_name.clone(),
        })?;
        result.push_str(&value);
    }

    Ok(result)
}

/// Variable lookup against the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
