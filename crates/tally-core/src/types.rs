// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Tally pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Platform-assigned identifier of a webhook delivery, used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

/// Unique identifier for a platform user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier of the chat (private or group) a reply should be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

/// Unique identifier for an analysis task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

/// The kind of an inbound webhook event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Text,
    File,
}

/// Payload of an inbound event, matching its [`EventKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    /// A text message (the analysis query).
    Text { text: String },
    /// A file upload reference. Bytes are fetched later via the
    /// platform client, not carried in the event.
    File {
        file_key: String,
        filename: String,
        #[serde(default)]
        size: Option<u64>,
    },
}

/// One raw webhook delivery, normalized by the transport layer.
///
/// Immutable once constructed; consumed exactly once by the classifier.
/// The transport guarantees at-least-once delivery, so the same
/// `event_id` may arrive more than once within a retry window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event_id: EventId,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: EventKind,
    pub received_at: DateTime<Utc>,
    pub payload: EventPayload,
}

/// A platform-agnostic piece of an outbound reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    /// A block of text.
    Text { text: String },
    /// A reference to a local image file (chart, figure).
    Image { path: PathBuf },
}

/// A request to the external analysis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The user's task description.
    pub query_text: String,
    /// Resolved attachment paths, in original arrival order.
    pub attachment_paths: Vec<PathBuf>,
    /// User-scoped directory the engine writes its artifacts into.
    pub output_dir: PathBuf,
    /// Optional engine-specific parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// The asynchronous result of an analysis engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOutcome {
    pub success: bool,
    /// Path of the generated report, when one was produced.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    /// Paths of generated chart images.
    #[serde(default)]
    pub chart_paths: Vec<PathBuf>,
    /// Human-readable failure description when `success` is false,
    /// or a final text result when no report file was written.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}
