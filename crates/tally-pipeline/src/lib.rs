// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Tally inbound event pipeline.
//!
//! Events flow through four stages, each owned by one module:
//!
//! 1. [`dedup`]: drop at-least-once duplicate deliveries.
//! 2. [`classifier`]: record file uploads, turn text into tasks.
//! 3. [`queue`]: bounded FIFO with per-user exclusivity.
//! 4. [`dispatcher`]: workers that resolve downloads, invoke the
//!    analysis engine, and deliver replies.
//!
//! [`registry`] holds per-user file state across stages, and
//! [`shutdown`] coordinates signal-driven teardown.

pub mod classifier;
pub mod dedup;
pub mod dispatcher;
pub mod queue;
pub mod registry;
pub mod shutdown;

pub use classifier::EventClassifier;
pub use dedup::Deduplicator;
pub use dispatcher::{Dispatcher, DispatcherOptions, TaskOutcome};
pub use queue::{SubmitOutcome, Task, TaskGuard, TaskQueue};
pub use registry::{ResolveReport, UserFileRecord, UserFileRegistry};
