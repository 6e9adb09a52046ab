//! Sentence segmentation for parallel synthesis

use std::sync::LazyLock;

use regex::Regex;

/// Runs of sentence-terminal punctuation
static TERMINAL_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.?!]+").expect("valid regex"));

/// A sentence-sized slice of a reply, synthesized on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position within the reply
    pub index: usize,
    /// Trimmed text, including its terminal punctuation
    pub text: String,
}

/// Split `text` into segments at runs of `.`, `?` or `!`
///
/// Each boundary belongs to the segment it ends. Trailing text without
/// terminal punctuation becomes the last segment; whitespace-only pieces are
/// dropped.
#[must_use]
pub fn split(text: &str) -> Vec<Segment> {
    let mut pieces = Vec::new();
    let mut previous_end = 0;

    for boundary in TERMINAL_PUNCTUATION.find_iter(text) {
        pieces.push(&text[previous_end..boundary.end()]);
        previous_end = boundary.end();
    }
    pieces.push(&text[previous_end..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(index, piece)| Segment {
            index,
            text: piece.to_string(),
        })
        .collect()
}
