// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the boundaries of the pipeline.

pub mod engine;
pub mod platform;
pub mod reply;

pub use engine::AnalysisEngine;
pub use platform::PlatformClient;
pub use reply::ReplyRenderer;
