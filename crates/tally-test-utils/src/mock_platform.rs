// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat platform for deterministic testing.
//!
//! `MockPlatform` implements `PlatformClient` with seeded downloadable
//! files and captured outbound replies for assertion in tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use tally_core::types::{ChatId, HealthStatus, Segment};
use tally_core::{PlatformClient, TallyError};

/// A mock chat platform for testing.
///
/// Provides two stores:
/// - **files**: Seeded via `seed_file()`, served by `download_file()`
/// - **sent**: Replies passed to `send_text()`/`send_segments()` are
///   captured and retrievable per chat
#[derive(Default)]
pub struct MockPlatform {
    files: Mutex<HashMap<String, Vec<u8>>>,
    texts: Mutex<Vec<(String, String)>>,
    segments: Mutex<Vec<(String, Vec<Segment>)>>,
    /// Remaining send_text calls that fail before succeeding again.
    send_failures: AtomicU32,
    /// Remaining download_file calls that fail before succeeding again.
    download_failures: AtomicU32,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `download_file` serve these bytes for `file_key`.
    pub fn seed_file(&self, file_key: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(file_key.to_string(), bytes.to_vec());
    }

    /// Makes the next `count` text sends fail with a platform error.
    pub fn fail_next_sends(&self, count: u32) {
        self.send_failures.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` downloads fail with a download error.
    pub fn fail_next_downloads(&self, count: u32) {
        self.download_failures.store(count, Ordering::SeqCst);
    }

    /// All texts sent so far, as `(chat_id, text)` pairs in send order.
    pub fn sent_texts(&self) -> Vec<(String, String)> {
        self.texts.lock().unwrap().clone()
    }

    /// Texts sent to one chat, in send order.
    pub fn texts_for(&self, chat_id: &str) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| chat == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// All segment replies sent so far, as `(chat_id, segments)` pairs.
    pub fn sent_segments(&self) -> Vec<(String, Vec<Segment>)> {
        self.segments.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn name(&self) -> &str {
        "mock-platform"
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<(), TallyError> {
        if self.send_failures.load(Ordering::SeqCst) > 0 {
            self.send_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(TallyError::Platform {
                message: "mock send failure".to_string(),
                source: None,
            });
        }
        self.texts
            .lock()
            .unwrap()
            .push((chat_id.0.clone(), text.to_string()));
        Ok(())
    }

    async fn send_segments(&self, chat_id: &ChatId, segments: &[Segment]) -> Result<(), TallyError> {
        self.segments
            .lock()
            .unwrap()
            .push((chat_id.0.clone(), segments.to_vec()));
        Ok(())
    }

    async fn download_file(&self, file_key: &str) -> Result<Vec<u8>, TallyError> {
        if self.download_failures.load(Ordering::SeqCst) > 0 {
            self.download_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(TallyError::Download {
                file_key: file_key.to_string(),
                message: "mock download failure".to_string(),
            });
        }
        self.files
            .lock()
            .unwrap()
            .get(file_key)
            .cloned()
            .ok_or_else(|| TallyError::Download {
                file_key: file_key.to_string(),
                message: "no such seeded file".to_string(),
            })
    }
}
