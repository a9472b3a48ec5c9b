// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry point for normalized inbound events.
//!
//! The classifier sits between the transport and the pipeline: it
//! deduplicates deliveries, records file uploads for later download,
//! and turns text messages into queued analysis tasks. It never blocks
//! on the engine; a text event either enqueues or gets an immediate
//! busy notice.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::PlatformClient;
use tally_core::types::{EventPayload, InboundEvent, TaskId};

use crate::dedup::Deduplicator;
use crate::queue::{SubmitOutcome, Task, TaskQueue};
use crate::registry::UserFileRegistry;

const FILE_ACK: &str =
    "Got your file. I will download it when your next analysis starts.";
const BUSY_NOTICE: &str =
    "I am at capacity right now. Please send your request again in a little while.";

/// Routes each admitted event to the registry or the task queue.
pub struct EventClassifier {
    dedup: Arc<Deduplicator>,
    registry: Arc<UserFileRegistry>,
    queue: Arc<TaskQueue>,
    platform: Arc<dyn PlatformClient>,
}

impl EventClassifier {
    pub fn new(
        dedup: Arc<Deduplicator>,
        registry: Arc<UserFileRegistry>,
        queue: Arc<TaskQueue>,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            dedup,
            registry,
            queue,
            platform,
        }
    }

    /// Handles one delivery. Duplicate and empty events are dropped
    /// with no observable effect.
    pub async fn handle(&self, event: InboundEvent) {
        if !self.dedup.admit(&event.event_id) {
            debug!(event_id = %event.event_id.0, "duplicate delivery dropped");
            return;
        }

        match event.payload {
            EventPayload::File {
                file_key, filename, ..
            } => {
                self.registry
                    .record_file(&event.user_id, &file_key, &filename);
                if let Err(e) = self.platform.send_text(&event.chat_id, FILE_ACK).await {
                    warn!(
                        user_id = %event.user_id.0,
                        error = %e,
                        "file acknowledgement not delivered"
                    );
                }
            }
            EventPayload::Text { text } => {
                let query = text.trim();
                if query.is_empty() {
                    debug!(event_id = %event.event_id.0, "empty text event skipped");
                    return;
                }

                let attached_file_keys = self.registry.claim_pending(&event.user_id);
                let task = Task {
                    task_id: TaskId(Uuid::new_v4().to_string()),
                    user_id: event.user_id.clone(),
                    chat_id: event.chat_id.clone(),
                    query_text: query.to_string(),
                    attached_file_keys: attached_file_keys.clone(),
                    enqueued_at: event.received_at,
                };
                let task_id = task.task_id.0.clone();

                match self.queue.submit(task) {
                    SubmitOutcome::Accepted => {
                        info!(
                            task_id = %task_id,
                            user_id = %event.user_id.0,
                            files = attached_file_keys.len(),
                            "analysis task queued"
                        );
                    }
                    SubmitOutcome::Busy => {
                        // Give the claimed files back so the retry picks
                        // them up.
                        self.registry
                            .release_claim(&event.user_id, &attached_file_keys);
                        if let Err(e) =
                            self.platform.send_text(&event.chat_id, BUSY_NOTICE).await
                        {
                            warn!(
                                user_id = %event.user_id.0,
                                error = %e,
                                "busy notice not delivered"
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use tally_core::TallyError;
    use tally_core::types::{ChatId, EventId, EventKind, HealthStatus, Segment, UserId};

    #[derive(Default)]
    struct AckingPlatform {
        texts: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl PlatformClient for AckingPlatform {
        fn name(&self) -> &str {
            "acking"
        }

        async fn health_check(&self) -> Result<HealthStatus, TallyError> {
            Ok(HealthStatus::Healthy)
        }

        async fn send_text(&self, _chat_id: &ChatId, text: &str) -> Result<(), TallyError> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_segments(
            &self,
            _chat_id: &ChatId,
            _segments: &[Segment],
        ) -> Result<(), TallyError> {
            Ok(())
        }

        async fn download_file(&self, file_key: &str) -> Result<Vec<u8>, TallyError> {
            Err(TallyError::Download {
                file_key: file_key.to_string(),
                message: "not used here".to_string(),
            })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: Arc<UserFileRegistry>,
        queue: Arc<TaskQueue>,
        platform: Arc<AckingPlatform>,
        classifier: EventClassifier,
    }

    fn fixture(capacity: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let dedup = Arc::new(Deduplicator::new(Duration::from_secs(60)));
        let registry = Arc::new(UserFileRegistry::new(dir.path()).unwrap());
        let queue = Arc::new(TaskQueue::new(capacity));
        let platform = Arc::new(AckingPlatform::default());
        let classifier = EventClassifier::new(
            dedup,
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&platform) as Arc<dyn PlatformClient>,
        );
        Fixture {
            _dir: dir,
            registry,
            queue,
            platform,
            classifier,
        }
    }

    fn text_event(id: &str, user: &str, text: &str) -> InboundEvent {
        InboundEvent {
            event_id: EventId(id.to_string()),
            user_id: UserId(user.to_string()),
            chat_id: ChatId(format!("c-{user}")),
            kind: EventKind::Text,
            received_at: Utc::now(),
            payload: EventPayload::Text {
                text: text.to_string(),
            },
        }
    }

    fn file_event(id: &str, user: &str, key: &str, filename: &str) -> InboundEvent {
        InboundEvent {
            event_id: EventId(id.to_string()),
            user_id: UserId(user.to_string()),
            chat_id: ChatId(format!("c-{user}")),
            kind: EventKind::File,
            received_at: Utc::now(),
            payload: EventPayload::File {
                file_key: key.to_string(),
                filename: filename.to_string(),
                size: None,
            },
        }
    }

    #[tokio::test]
    async fn file_event_records_and_acknowledges() {
        let fx = fixture(8);
        fx.classifier
            .handle(file_event("ev-1", "u1", "fk-1", "data.csv"))
            .await;

        let records = fx.registry.records(&UserId("u1".to_string()));
        assert_eq!(records.len(), 1);
        assert!(!records[0].downloaded);
        let texts = fx.platform.texts.lock().unwrap().clone();
        assert!(texts[0].contains("download it when"));
        assert_eq!(fx.queue.len(), 0);
    }

    #[tokio::test]
    async fn text_event_queues_task_with_claimed_files() {
        let fx = fixture(8);
        fx.classifier
            .handle(file_event("ev-1", "u1", "fk-1", "data.csv"))
            .await;
        fx.classifier
            .handle(text_event("ev-2", "u1", "  summarize the data  "))
            .await;

        assert_eq!(fx.queue.len(), 1);
        let guard = fx.queue.take().await.unwrap();
        assert_eq!(guard.query_text, "summarize the data");
        assert_eq!(guard.attached_file_keys, vec!["fk-1".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_delivery_has_no_effect() {
        let fx = fixture(8);
        fx.classifier
            .handle(text_event("ev-1", "u1", "analyze"))
            .await;
        fx.classifier
            .handle(text_event("ev-1", "u1", "analyze"))
            .await;

        assert_eq!(fx.queue.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_file_event_records_once() {
        let fx = fixture(8);
        fx.classifier
            .handle(file_event("ev-1", "u1", "fk-1", "data.csv"))
            .await;
        fx.classifier
            .handle(file_event("ev-1", "u1", "fk-1", "data.csv"))
            .await;

        assert_eq!(fx.registry.records(&UserId("u1".to_string())).len(), 1);
        // Only one acknowledgement went out.
        assert_eq!(fx.platform.texts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_text_is_skipped() {
        let fx = fixture(8);
        fx.classifier.handle(text_event("ev-1", "u1", "   ")).await;
        assert_eq!(fx.queue.len(), 0);
    }

    #[tokio::test]
    async fn busy_queue_sends_notice_and_releases_claim() {
        let fx = fixture(1);
        fx.classifier
            .handle(file_event("ev-0", "u2", "fk-1", "data.csv"))
            .await;
        fx.classifier
            .handle(text_event("ev-1", "u1", "first"))
            .await;
        fx.classifier
            .handle(text_event("ev-2", "u2", "second"))
            .await;

        assert_eq!(fx.queue.len(), 1);
        let texts = fx.platform.texts.lock().unwrap().clone();
        assert!(texts.iter().any(|t| t.contains("at capacity")));

        // The claim was returned, so u2's retry carries the file.
        let retry_keys = fx.registry.claim_pending(&UserId("u2".to_string()));
        assert_eq!(retry_keys, vec!["fk-1".to_string()]);
    }
}
