// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic webhook chat-platform adapter.
//!
//! Implements [`PlatformClient`] against two HTTP endpoints supplied by
//! configuration: a send URL taking reply segments as JSON, and a
//! download URL template with a `{file_key}` placeholder. Image
//! segments are inlined as base64 so the send endpoint needs no
//! separate upload step.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{debug, warn};

use tally_config::model::PlatformConfig;
use tally_core::types::{ChatId, HealthStatus, Segment};
use tally_core::{PlatformClient, TallyError};

/// Placeholder substituted with the file key in the download URL.
const FILE_KEY_PLACEHOLDER: &str = "{file_key}";

/// Wire form of one reply segment.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireSegment {
    Text { text: String },
    Image { filename: String, data: String },
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    chat_id: &'a str,
    segments: Vec<WireSegment>,
}

/// Webhook-backed implementation of [`PlatformClient`].
#[derive(Debug)]
pub struct WebhookPlatform {
    client: reqwest::Client,
    send_url: String,
    download_url: String,
}

impl WebhookPlatform {
    /// Creates an adapter from the `[platform]` configuration section.
    ///
    /// Requires `send_url` and `download_url`; the download URL must
    /// contain the `{file_key}` placeholder.
    pub fn new(config: &PlatformConfig) -> Result<Self, TallyError> {
        let send_url = config
            .send_url
            .clone()
            .ok_or_else(|| TallyError::Config("platform.send_url is required".into()))?;
        let download_url = config
            .download_url
            .clone()
            .ok_or_else(|| TallyError::Config("platform.download_url is required".into()))?;
        if !download_url.contains(FILE_KEY_PLACEHOLDER) {
            return Err(TallyError::Config(format!(
                "platform.download_url must contain the {FILE_KEY_PLACEHOLDER} placeholder"
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = config.auth_token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TallyError::Config(format!("invalid platform auth token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TallyError::Platform {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            send_url,
            download_url,
        })
    }

    async fn post_segments(
        &self,
        chat_id: &ChatId,
        segments: Vec<WireSegment>,
    ) -> Result<(), TallyError> {
        let request = SendRequest {
            chat_id: &chat_id.0,
            segments,
        };
        let response = self
            .client
            .post(&self.send_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TallyError::Platform {
                message: format!("send request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "platform rejected outbound message");
            return Err(TallyError::Platform {
                message: format!("platform returned {status}: {body}"),
                source: None,
            });
        }
        debug!(chat_id = %chat_id.0, "outbound message delivered");
        Ok(())
    }

    /// Converts pipeline segments to wire form, inlining image bytes.
    async fn encode_segments(&self, segments: &[Segment]) -> Result<Vec<WireSegment>, TallyError> {
        let mut wire = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                Segment::Text { text } => wire.push(WireSegment::Text { text: text.clone() }),
                Segment::Image { path } => {
                    let bytes = tokio::fs::read(path).await?;
                    let filename = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("image.png")
                        .to_string();
                    wire.push(WireSegment::Image {
                        filename,
                        data: BASE64.encode(&bytes),
                    });
                }
            }
        }
        Ok(wire)
    }
}

#[async_trait]
impl PlatformClient for WebhookPlatform {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        // HEAD against the send endpoint tells us whether the platform
        // is reachable at all; the status code is not interpreted.
        match self.client.head(&self.send_url).send().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "platform unreachable: {e}"
            ))),
        }
    }

    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<(), TallyError> {
        self.post_segments(
            chat_id,
            vec![WireSegment::Text {
                text: text.to_string(),
            }],
        )
        .await
    }

    async fn send_segments(&self, chat_id: &ChatId, segments: &[Segment]) -> Result<(), TallyError> {
        let wire = self.encode_segments(segments).await?;
        self.post_segments(chat_id, wire).await
    }

    async fn download_file(&self, file_key: &str) -> Result<Vec<u8>, TallyError> {
        let url = self.download_url.replace(FILE_KEY_PLACEHOLDER, file_key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TallyError::Download {
                file_key: file_key.to_string(),
                message: format!("download request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TallyError::Download {
                file_key: file_key.to_string(),
                message: format!("platform returned {status}"),
            });
        }

        let bytes = response.bytes().await.map_err(|e| TallyError::Download {
            file_key: file_key.to_string(),
            message: format!("reading download body failed: {e}"),
        })?;
        debug!(file_key, bytes = bytes.len(), "file downloaded");
        Ok(bytes.to_vec())
    }
}
