// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool that drains the task queue and drives the analysis engine.
//!
//! Each worker loops on [`TaskQueue::take`], so per-user exclusivity and
//! FIFO ordering are enforced by the queue, not here. For one task a
//! worker acknowledges the user, resolves deferred downloads, invokes
//! the engine under a timeout, and delivers either the rendered report,
//! a plain text result, or a failure notice. Every failure mode ends in
//! a user-visible reply; a task never vanishes silently.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tally_core::types::{AnalysisRequest, ChatId, Segment};
use tally_core::{AnalysisEngine, PlatformClient, ReplyRenderer, TallyError};

use crate::queue::{TaskGuard, TaskQueue};
use crate::registry::UserFileRegistry;

/// Tunables for task processing.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Hard wall-clock limit on one engine invocation.
    pub engine_timeout: Duration,
    /// Delivery attempts for outbound replies.
    pub reply_retry_attempts: u32,
    /// Pause between delivery attempts.
    pub reply_retry_backoff: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            engine_timeout: Duration::from_secs(900),
            reply_retry_attempts: 3,
            reply_retry_backoff: Duration::from_millis(500),
        }
    }
}

/// How one task ended, for logging and tests.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed { report_path: Option<PathBuf> },
    Failed(String),
}

/// Drives queued tasks through download, analysis, and reply delivery.
pub struct Dispatcher {
    queue: Arc<TaskQueue>,
    registry: Arc<UserFileRegistry>,
    engine: Arc<dyn AnalysisEngine>,
    renderer: Arc<dyn ReplyRenderer>,
    platform: Arc<dyn PlatformClient>,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<TaskQueue>,
        registry: Arc<UserFileRegistry>,
        engine: Arc<dyn AnalysisEngine>,
        renderer: Arc<dyn ReplyRenderer>,
        platform: Arc<dyn PlatformClient>,
        options: DispatcherOptions,
    ) -> Self {
        Self {
            queue,
            registry,
            engine,
            renderer,
            platform,
            options,
        }
    }

    /// Spawns `count` worker loops that run until the queue closes.
    pub fn spawn_workers(self: &Arc<Self>, count: usize) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|worker| {
                let dispatcher = Arc::clone(self);
                tokio::spawn(async move {
                    info!(worker, "dispatch worker started");
                    dispatcher.worker_loop(worker).await;
                    info!(worker, "dispatch worker stopped");
                })
            })
            .collect()
    }

    async fn worker_loop(&self, worker: usize) {
        while let Some(guard) = self.queue.take().await {
            let task_id = guard.task_id.0.clone();
            let outcome = self.process_task(&guard).await;
            match outcome {
                TaskOutcome::Completed { ref report_path } => {
                    info!(worker, task_id = %task_id, report = ?report_path, "task completed");
                }
                TaskOutcome::Failed(ref reason) => {
                    warn!(worker, task_id = %task_id, reason = %reason, "task failed");
                }
            }
        }
    }

    /// Runs one task end-to-end. Always replies to the user, even on failure.
    pub async fn process_task(&self, task: &TaskGuard) -> TaskOutcome {
        let chat_id = &task.chat_id;

        // Acknowledgement is best effort; a send failure must not cost
        // the user their queued analysis.
        if let Err(e) = self
            .platform
            .send_text(chat_id, "Starting your analysis, this may take a few minutes.")
            .await
        {
            warn!(task_id = %task.task_id.0, error = %e, "failed to acknowledge task start");
        }

        let report = match self
            .registry
            .resolve_pending(&task.user_id, self.platform.as_ref())
            .await
        {
            Ok(report) => report,
            Err(e) => {
                let reason = format!("could not prepare data files: {e}");
                self.reply_failure(chat_id, &reason).await;
                return TaskOutcome::Failed(reason);
            }
        };

        let attachment_paths = match self.collect_data_files(task, &report.resolved) {
            Ok(paths) => paths,
            Err(e) => {
                let reason = format!("could not read data directory: {e}");
                self.reply_failure(chat_id, &reason).await;
                return TaskOutcome::Failed(reason);
            }
        };

        // Nothing to analyze: tell the user and skip the engine entirely.
        if attachment_paths.is_empty() {
            let notice = "I have no data files for you yet. Please upload a data file, \
                          then send your analysis request again.";
            self.reply_failure(chat_id, notice).await;
            return TaskOutcome::Failed("no data files available".to_string());
        }

        let mut query_text = task.query_text.clone();
        if !report.is_complete() {
            let failed = report.failed.join(", ");
            query_text.push_str(&format!(
                "\n\nNote: the following uploaded files could not be retrieved \
                 and are not included: {failed}"
            ));
        }

        let output_dir = match self.registry.user_output_dir(&task.user_id) {
            Ok(dir) => dir,
            Err(e) => {
                let reason = format!("could not prepare output directory: {e}");
                self.reply_failure(chat_id, &reason).await;
                return TaskOutcome::Failed(reason);
            }
        };

        let request = AnalysisRequest {
            query_text,
            attachment_paths,
            output_dir,
            extra: None,
        };

        debug!(
            task_id = %task.task_id.0,
            files = request.attachment_paths.len(),
            "invoking analysis engine"
        );

        let outcome = match tokio::time::timeout(
            self.options.engine_timeout,
            self.engine.analyze(request),
        )
        .await
        {
            Err(_) => {
                let reason = format!(
                    "the analysis did not finish within {} seconds and was cancelled",
                    self.options.engine_timeout.as_secs()
                );
                self.reply_failure(chat_id, &reason).await;
                return TaskOutcome::Failed(reason);
            }
            Ok(Err(e)) => {
                warn!(task_id = %task.task_id.0, error = %e, "engine invocation failed");
                let reason = "the analysis engine could not be reached, please try again later";
                self.reply_failure(chat_id, reason).await;
                return TaskOutcome::Failed(reason.to_string());
            }
            Ok(Ok(outcome)) => outcome,
        };

        if !outcome.success {
            let reason = outcome
                .error_message
                .unwrap_or_else(|| "the analysis failed for an unknown reason".to_string());
            self.reply_failure(chat_id, &format!("Analysis failed: {reason}"))
                .await;
            return TaskOutcome::Failed(reason);
        }

        match outcome.report_path {
            Some(report_path) => {
                let segments = match self.renderer.render(&report_path) {
                    Ok(segments) => segments,
                    Err(e) => {
                        let reason = format!("could not render the report: {e}");
                        self.reply_failure(chat_id, &reason).await;
                        return TaskOutcome::Failed(reason);
                    }
                };
                if let Err(e) = self.send_segments_with_retry(chat_id, &segments).await {
                    let reason = format!("report delivery failed: {e}");
                    return TaskOutcome::Failed(reason);
                }
                TaskOutcome::Completed {
                    report_path: Some(report_path),
                }
            }
            None => {
                let text = outcome
                    .error_message
                    .unwrap_or_else(|| "Analysis finished with no report.".to_string());
                if let Err(e) = self.send_text_with_retry(chat_id, &text).await {
                    let reason = format!("result delivery failed: {e}");
                    return TaskOutcome::Failed(reason);
                }
                TaskOutcome::Completed { report_path: None }
            }
        }
    }

    /// The engine gets every file in the user's data directory:
    /// freshly resolved attachments first (arrival order), then files
    /// left over from earlier tasks.
    fn collect_data_files(
        &self,
        task: &TaskGuard,
        resolved: &[PathBuf],
    ) -> Result<Vec<PathBuf>, TallyError> {
        let data_dir = self.registry.user_data_dir(&task.user_id)?;
        let mut paths: Vec<PathBuf> = resolved.to_vec();

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&data_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && !paths.contains(path))
            .collect();
        entries.sort();
        paths.extend(entries);
        Ok(paths)
    }

    async fn reply_failure(&self, chat_id: &ChatId, message: &str) {
        if let Err(e) = self.send_text_with_retry(chat_id, message).await {
            warn!(chat_id = %chat_id.0, error = %e, "failure notice could not be delivered");
        }
    }

    async fn send_text_with_retry(&self, chat_id: &ChatId, text: &str) -> Result<(), TallyError> {
        let attempts = self.options.reply_retry_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.platform.send_text(chat_id, text).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(chat_id = %chat_id.0, attempt, error = %e, "text delivery failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.options.reply_retry_backoff).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TallyError::Internal("no delivery attempt made".into())))
    }

    async fn send_segments_with_retry(
        &self,
        chat_id: &ChatId,
        segments: &[Segment],
    ) -> Result<(), TallyError> {
        let attempts = self.options.reply_retry_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.platform.send_segments(chat_id, segments).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(chat_id = %chat_id.0, attempt, error = %e, "segment delivery failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.options.reply_retry_backoff).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TallyError::Internal("no delivery attempt made".into())))
    }
}
