// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-zero worker counts and well-formed URLs.

use crate::diagnostic::ConfigError;
use crate::model::TallyConfig;

const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !KNOWN_LOG_LEVELS.contains(&config.server.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "server.log_level `{}` is not one of: {}",
                config.server.log_level,
                KNOWN_LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.server.bind_address.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.bind_address must not be empty".to_string(),
        });
    }

    if config.pipeline.workers == 0 {
        errors.push(ConfigError::Validation {
            message: "pipeline.workers must be at least 1".to_string(),
        });
    }

    if config.pipeline.queue_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "pipeline.queue_capacity must be at least 1".to_string(),
        });
    }

    if config.pipeline.dedup_retention_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "pipeline.dedup_retention_secs must be greater than zero".to_string(),
        });
    }

    if config.pipeline.engine_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "pipeline.engine_timeout_secs must be greater than zero".to_string(),
        });
    }

    if config.storage.base_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.base_dir must not be empty".to_string(),
        });
    }

    // URL shape checks only apply when the value is present; whether a
    // URL is required at all depends on the selected platform kind and
    // is checked at serve wiring time.
    for (key, value) in [
        ("platform.send_url", &config.platform.send_url),
        ("platform.download_url", &config.platform.download_url),
        ("engine.url", &config.engine.url),
    ] {
        if let Some(url) = value
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(ConfigError::Validation {
                message: format!("{key} `{url}` must start with http:// or https://"),
            });
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
