// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report rendering for outbound replies.
//!
//! The analysis engine writes a Markdown report into the user's output
//! directory, with charts referenced through standard image syntax.
//! [`MarkdownRenderer`] splits such a report into an ordered list of
//! [`Segment`]s: text runs stay text, image references whose files
//! exist become image segments so the platform adapter can attach the
//! actual chart bytes.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use tally_core::types::Segment;
use tally_core::{ReplyRenderer, TallyError};

/// Matches `![alt](path)` image references.
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(([^)\s]+)\)").unwrap());

/// Upper bound on one text segment, in characters. Chat platforms cap
/// message length around this size.
const MAX_TEXT_SEGMENT: usize = 4000;

/// Splits a Markdown report into text and image segments.
#[derive(Debug, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Appends `text` as one or more segments, each at most
    /// [`MAX_TEXT_SEGMENT`] characters, splitting at line boundaries
    /// where possible.
    fn push_text(segments: &mut Vec<Segment>, text: &str) {
        let mut rest = text;
        while !rest.is_empty() {
            if rest.chars().count() <= MAX_TEXT_SEGMENT {
                segments.push(Segment::Text {
                    text: rest.to_string(),
                });
                return;
            }

            let hard_limit: usize = rest
                .char_indices()
                .nth(MAX_TEXT_SEGMENT)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            // Prefer breaking at the last newline inside the window.
            let cut = rest[..hard_limit]
                .rfind('\n')
                .map(|i| i + 1)
                .unwrap_or(hard_limit);
            segments.push(Segment::Text {
                text: rest[..cut].trim_end().to_string(),
            });
            rest = rest[cut..].trim_start_matches('\n');
        }
    }

    /// Resolves an image reference against the report's directory.
    ///
    /// Absolute references are used as-is. A reference whose file does
    /// not exist is left in the surrounding text so the user still sees
    /// that a chart was meant to be there.
    fn resolve_image(report_dir: &Path, reference: &str) -> Option<PathBuf> {
        let raw = Path::new(reference);
        let path = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            report_dir.join(raw)
        };
        if path.is_file() {
            Some(path)
        } else {
            warn!(reference, "report references a missing image");
            None
        }
    }
}

impl ReplyRenderer for MarkdownRenderer {
    fn render(&self, report_path: &Path) -> Result<Vec<Segment>, TallyError> {
        let content = std::fs::read_to_string(report_path)?;
        let report_dir = report_path.parent().unwrap_or(Path::new("."));

        let mut segments = Vec::new();
        let mut text_buf = String::new();
        let mut cursor = 0;

        for captures in IMAGE_RE.captures_iter(&content) {
            let whole = captures.get(0).unwrap();
            let reference = &captures[1];

            text_buf.push_str(&content[cursor..whole.start()]);
            cursor = whole.end();

            match Self::resolve_image(report_dir, reference) {
                Some(path) => {
                    let text = text_buf.trim();
                    if !text.is_empty() {
                        Self::push_text(&mut segments, text);
                    }
                    text_buf.clear();
                    segments.push(Segment::Image { path });
                }
                None => {
                    // Keep the reference inline as plain text.
                    text_buf.push_str(whole.as_str());
                }
            }
        }
        text_buf.push_str(&content[cursor..]);

        let trailing = text_buf.trim();
        if !trailing.is_empty() {
            Self::push_text(&mut segments, trailing);
        }

        if segments.is_empty() {
            return Err(TallyError::Internal(format!(
                "report {} is empty",
                report_path.display()
            )));
        }
        Ok(segments)
    }
}
