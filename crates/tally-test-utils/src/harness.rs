// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Harness for end-to-end pipeline testing.
//!
//! `PipelineHarness` assembles the complete inbound pipeline with mock
//! platform and engine on a temp directory, spawns dispatch workers,
//! and provides helpers to inject events and await replies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use tally_core::types::{ChatId, EventId, EventKind, EventPayload, InboundEvent, UserId};
use tally_core::{AnalysisEngine, PlatformClient, TallyError};
use tally_pipeline::{
    Deduplicator, Dispatcher, DispatcherOptions, EventClassifier, TaskQueue, UserFileRegistry,
};
use tally_report::MarkdownRenderer;

use crate::mock_engine::{CannedOutcome, MockEngine};
use crate::mock_platform::MockPlatform;

/// Builder for creating pipeline test environments.
pub struct PipelineHarnessBuilder {
    workers: usize,
    queue_capacity: usize,
    dedup_retention: Duration,
    engine_timeout: Duration,
    script: Vec<CannedOutcome>,
}

impl PipelineHarnessBuilder {
    fn new() -> Self {
        Self {
            workers: 3,
            queue_capacity: 8,
            dedup_retention: Duration::from_secs(3600),
            engine_timeout: Duration::from_secs(5),
            script: Vec::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_dedup_retention(mut self, retention: Duration) -> Self {
        self.dedup_retention = retention;
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }

    /// Scripts the mock engine's outcomes, in call order.
    pub fn with_engine_script(mut self, script: Vec<CannedOutcome>) -> Self {
        self.script = script;
        self
    }

    /// Builds the harness and spawns the dispatch workers.
    pub fn build(self) -> Result<PipelineHarness, TallyError> {
        let temp_dir = tempfile::TempDir::new()?;
        let platform = Arc::new(MockPlatform::new());
        let engine = Arc::new(MockEngine::scripted(self.script));

        let dedup = Arc::new(Deduplicator::new(self.dedup_retention));
        let registry = Arc::new(UserFileRegistry::new(temp_dir.path())?);
        let queue = Arc::new(TaskQueue::new(self.queue_capacity));

        let classifier = Arc::new(EventClassifier::new(
            Arc::clone(&dedup),
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&platform) as Arc<dyn PlatformClient>,
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&engine) as Arc<dyn AnalysisEngine>,
            Arc::new(MarkdownRenderer::new()),
            Arc::clone(&platform) as Arc<dyn PlatformClient>,
            DispatcherOptions {
                engine_timeout: self.engine_timeout,
                reply_retry_attempts: 3,
                reply_retry_backoff: Duration::from_millis(10),
            },
        ));
        let workers = dispatcher.spawn_workers(self.workers);

        Ok(PipelineHarness {
            _temp_dir: temp_dir,
            platform,
            engine,
            registry,
            queue,
            classifier,
            workers,
        })
    }
}

/// A complete pipeline wired to mocks, with workers running.
pub struct PipelineHarness {
    _temp_dir: tempfile::TempDir,
    pub platform: Arc<MockPlatform>,
    pub engine: Arc<MockEngine>,
    pub registry: Arc<UserFileRegistry>,
    pub queue: Arc<TaskQueue>,
    pub classifier: Arc<EventClassifier>,
    workers: Vec<JoinHandle<()>>,
}

impl PipelineHarness {
    pub fn builder() -> PipelineHarnessBuilder {
        PipelineHarnessBuilder::new()
    }

    /// Injects a text event with a fresh event id.
    pub async fn send_text(&self, user: &str, text: &str) {
        self.send_event(text_event(
            &Uuid::new_v4().to_string(),
            user,
            text,
        ))
        .await;
    }

    /// Injects a file upload event with a fresh event id.
    pub async fn send_file(&self, user: &str, file_key: &str, filename: &str) {
        self.send_event(file_event(
            &Uuid::new_v4().to_string(),
            user,
            file_key,
            filename,
        ))
        .await;
    }

    pub async fn send_event(&self, event: InboundEvent) {
        self.classifier.handle(event).await;
    }

    /// The chat id the harness derives for a user's events.
    pub fn chat_for(&self, user: &str) -> String {
        format!("chat-{user}")
    }

    /// Waits until a text matching `predicate` was sent to the user's chat.
    ///
    /// Panics after `timeout`, listing what actually arrived.
    pub async fn await_text(
        &self,
        user: &str,
        timeout: Duration,
        predicate: impl Fn(&str) -> bool,
    ) -> String {
        let chat = self.chat_for(user);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(text) = self
                .platform
                .texts_for(&chat)
                .into_iter()
                .find(|t| predicate(t))
            {
                return text;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "no matching text for {chat} within {timeout:?}; got {:?}",
                    self.platform.texts_for(&chat)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Waits until a segment reply reached the user's chat.
    pub async fn await_segments(
        &self,
        user: &str,
        timeout: Duration,
    ) -> Vec<tally_core::types::Segment> {
        let chat = self.chat_for(user);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some((_, segments)) = self
                .platform
                .sent_segments()
                .into_iter()
                .find(|(c, _)| c == &chat)
            {
                return segments;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("no segment reply for {chat} within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Closes the queue and waits for the workers to exit.
    pub async fn shutdown(self) {
        self.queue.close();
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Builds a text event with deterministic user/chat ids.
pub fn text_event(event_id: &str, user: &str, text: &str) -> InboundEvent {
    InboundEvent {
        event_id: EventId(event_id.to_string()),
        user_id: UserId(user.to_string()),
        chat_id: ChatId(format!("chat-{user}")),
        kind: EventKind::Text,
        received_at: Utc::now(),
        payload: EventPayload::Text {
            text: text.to_string(),
        },
    }
}

/// Builds a file upload event with deterministic user/chat ids.
pub fn file_event(event_id: &str, user: &str, file_key: &str, filename: &str) -> InboundEvent {
    InboundEvent {
        event_id: EventId(event_id.to_string()),
        user_id: UserId(user.to_string()),
        chat_id: ChatId(format!("chat-{user}")),
        kind: EventKind::File,
        received_at: Utc::now(),
        payload: EventPayload::File {
            file_key: file_key.to_string(),
            filename: filename.to_string(),
            size: None,
        },
    }
}
