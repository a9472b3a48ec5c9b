// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tally event pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Tally configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Server identity and ingress settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Inbound pipeline tuning (workers, queue, dedup window, timeouts).
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Filesystem layout for per-user data and output trees.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat platform outbound API settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// External analysis engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Server identity and ingress configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Display name of the service.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bind address of the normalized-event ingress endpoint.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            log_level: default_log_level(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_server_name() -> String {
    "tally".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1:8600".to_string()
}

/// Inbound pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of dispatcher workers consuming the task queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of queued (not yet dispatched) tasks before
    /// submissions are rejected with a busy notice.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Retention window for event-id deduplication, in seconds.
    /// An admitted id becomes eligible again strictly after this window.
    #[serde(default = "default_dedup_retention_secs")]
    pub dedup_retention_secs: u64,

    /// Maximum duration of a single analysis engine invocation, in seconds.
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,

    /// Attempts made to deliver a reply before dropping it.
    #[serde(default = "default_reply_retry_attempts")]
    pub reply_retry_attempts: u32,

    /// Fixed backoff between reply delivery attempts, in milliseconds.
    #[serde(default = "default_reply_retry_backoff_ms")]
    pub reply_retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            dedup_retention_secs: default_dedup_retention_secs(),
            engine_timeout_secs: default_engine_timeout_secs(),
            reply_retry_attempts: default_reply_retry_attempts(),
            reply_retry_backoff_ms: default_reply_retry_backoff_ms(),
        }
    }
}

fn default_workers() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    32
}

// 7.5 hours, matching the platform's webhook redelivery horizon.
fn default_dedup_retention_secs() -> u64 {
    27_000
}

fn default_engine_timeout_secs() -> u64 {
    900
}

fn default_reply_retry_attempts() -> u32 {
    3
}

fn default_reply_retry_backoff_ms() -> u64 {
    500
}

/// Filesystem layout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Base directory holding `users/{user_id}/data` and
    /// `users/{user_id}/output` trees.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

fn default_base_dir() -> String {
    "./tally_data".to_string()
}

/// Chat platform outbound API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Concrete platform implementation to instantiate at startup.
    #[serde(default = "default_platform_kind")]
    pub kind: String,

    /// Endpoint that accepts outbound message segments.
    #[serde(default)]
    pub send_url: Option<String>,

    /// URL template for file downloads; `{file_key}` is substituted.
    #[serde(default)]
    pub download_url: Option<String>,

    /// Optional bearer token attached to platform API requests.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            kind: default_platform_kind(),
            send_url: None,
            download_url: None,
            auth_token: None,
        }
    }
}

fn default_platform_kind() -> String {
    "webhook".to_string()
}

/// External analysis engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Endpoint of the analysis engine service.
    #[serde(default)]
    pub url: Option<String>,

    /// Optional bearer token attached to engine requests.
    #[serde(default)]
    pub auth_token: Option<String>,
}
