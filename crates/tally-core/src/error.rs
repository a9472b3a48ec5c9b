// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tally event pipeline.

use thiserror::Error;

/// The primary error type used across all Tally adapter traits and pipeline operations.
///
/// Duplicate events and queue saturation are not represented here: the
/// former is silently absorbed by the deduplicator and the latter is a
/// normal submit outcome surfaced to the user as a retry-later notice,
/// not an error.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration errors (invalid TOML, missing required fields, unknown platform kind).
    #[error("configuration error: {0}")]
    Config(String),

    /// Platform client errors (send failure, API rejection, transport problems).
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single file download failed. Partial-tolerant: the dispatcher
    /// may proceed with the files that did resolve.
    #[error("download failed for file `{file_key}`: {message}")]
    Download { file_key: String, message: String },

    /// Analysis engine errors (invocation failure, malformed outcome).
    #[error("engine error: {message}")]
    Engine {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Filesystem errors (user directory creation, attachment persistence).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
