// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core trait definitions, error types, and common types for Tally.
//!
//! Tally ingests chat-platform webhook events, deduplicates them,
//! tracks uploaded files for deferred download, and serializes them
//! into per-user analysis tasks. This crate holds the shared vocabulary:
//! the [`TallyError`] taxonomy, the domain types, and the adapter traits
//! every boundary implementation plugs into.

pub mod error;
pub mod traits;
pub mod types;

pub use error::TallyError;
pub use traits::{AnalysisEngine, PlatformClient, ReplyRenderer};
