// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tally integration tests.
//!
//! Provides mock adapters and a pipeline harness for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockPlatform`] - Mock chat platform with captured replies and seeded files
//! - [`MockEngine`] - Mock analysis engine with pre-configured outcomes
//! - [`PipelineHarness`] - Full pipeline (classifier, queue, workers) on a temp directory

pub mod harness;
pub mod mock_engine;
pub mod mock_platform;

pub use harness::{PipelineHarness, PipelineHarnessBuilder};
pub use mock_engine::{CannedOutcome, MockEngine};
pub use mock_platform::MockPlatform;
