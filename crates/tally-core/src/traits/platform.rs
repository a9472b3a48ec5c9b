// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform client trait for chat-platform integrations.
//!
//! One implementation exists per platform, selected by a factory at
//! startup. The pipeline depends only on this interface: it sends
//! replies and downloads uploaded files, nothing platform-specific
//! leaks past this seam.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::types::{ChatId, HealthStatus, Segment};

/// Client for the chat platform's outbound API surface.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Short platform name for logs ("webhook", "mock", ...).
    fn name(&self) -> &str;

    /// Checks whether the platform API is reachable.
    async fn health_check(&self) -> Result<HealthStatus, TallyError>;

    /// Sends a plain text message to a chat.
    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<(), TallyError>;

    /// Sends an ordered sequence of message segments to a chat.
    async fn send_segments(
        &self,
        chat_id: &ChatId,
        segments: &[Segment],
    ) -> Result<(), TallyError>;

    /// Downloads the bytes of an uploaded file by its platform key.
    async fn download_file(&self, file_key: &str) -> Result<Vec<u8>, TallyError>;
}
