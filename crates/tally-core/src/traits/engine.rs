// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Analysis engine trait.
//!
//! The engine is an external collaborator: it takes a task description
//! plus resolved data files and produces a report artifact (or a
//! failure). The pipeline never looks inside the engine; it only wraps
//! the call with a timeout and converts failures into user replies.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::types::{AnalysisRequest, EngineOutcome};

/// An opaque asynchronous analysis operation.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Runs one analysis task end-to-end.
    ///
    /// A failed analysis is an `Ok(EngineOutcome { success: false, .. })`;
    /// `Err` is reserved for invocation-level failures (engine
    /// unreachable, malformed response).
    async fn analyze(&self, request: AnalysisRequest) -> Result<EngineOutcome, TallyError>;
}
