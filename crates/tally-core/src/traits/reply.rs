// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply renderer trait.

use std::path::Path;

use crate::error::TallyError;
use crate::types::Segment;

/// Converts a report artifact into platform-agnostic message segments.
pub trait ReplyRenderer: Send + Sync {
    /// Renders the report at `report_path` into an ordered sequence of
    /// text blocks and image references.
    fn render(&self, report_path: &Path) -> Result<Vec<Segment>, TallyError>;
}
