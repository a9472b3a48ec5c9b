// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock analysis engine with pre-configured outcomes.
//!
//! `MockEngine` implements `AnalysisEngine`, popping one canned outcome
//! per call (the last one repeats once the queue is drained) and
//! recording every request for assertion.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use tally_core::types::{AnalysisRequest, EngineOutcome};
use tally_core::{AnalysisEngine, TallyError};

/// One scripted engine behavior.
#[derive(Debug, Clone)]
pub enum CannedOutcome {
    /// Succeed, writing `markdown` as a report file into the output dir.
    Report { markdown: String },
    /// Succeed with a plain text result and no report file.
    Text { text: String },
    /// Run to completion but report an analysis failure.
    Failure { reason: String },
    /// Fail at the invocation level (engine unreachable).
    InvocationError { message: String },
    /// Sleep before succeeding with a text result, for timeout tests.
    Slow { delay: Duration, text: String },
}

/// A mock analysis engine for testing.
pub struct MockEngine {
    script: Mutex<VecDeque<CannedOutcome>>,
    requests: Mutex<Vec<AnalysisRequest>>,
    calls: AtomicUsize,
}

impl MockEngine {
    /// Creates an engine that always answers with a plain "ok" text.
    pub fn new() -> Self {
        Self::scripted(vec![])
    }

    /// Creates an engine following `outcomes` in order; the final
    /// outcome repeats for any further calls.
    pub fn scripted(outcomes: Vec<CannedOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of analyze calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in call order.
    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> CannedOutcome {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or(CannedOutcome::Text {
                    text: "ok".to_string(),
                })
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisEngine for MockEngine {
    async fn analyze(&self, request: AnalysisRequest) -> Result<EngineOutcome, TallyError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.next_outcome();
        self.requests.lock().unwrap().push(request.clone());

        match outcome {
            CannedOutcome::Report { markdown } => {
                let report_path = request.output_dir.join(format!("report-{index}.md"));
                tokio::fs::write(&report_path, markdown).await?;
                Ok(EngineOutcome {
                    success: true,
                    report_path: Some(report_path),
                    chart_paths: Vec::new(),
                    error_message: None,
                })
            }
            CannedOutcome::Text { text } => Ok(EngineOutcome {
                success: true,
                report_path: None,
                chart_paths: Vec::new(),
                error_message: Some(text),
            }),
            CannedOutcome::Failure { reason } => Ok(EngineOutcome {
                success: false,
                report_path: None,
                chart_paths: Vec::new(),
                error_message: Some(reason),
            }),
            CannedOutcome::InvocationError { message } => Err(TallyError::Engine {
                message,
                source: None,
            }),
            CannedOutcome::Slow { delay, text } => {
                tokio::time::sleep(delay).await;
                Ok(EngineOutcome {
                    success: true,
                    report_path: None,
                    chart_paths: Vec::new(),
                    error_message: Some(text),
                })
            }
        }
    }
}
