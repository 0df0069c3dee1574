//! Patch block extraction.
//!
//! A block is four literal markers with three content regions between them:
//!
//! ```text
//! [<({START})>]       path/to/file.rs
//! [<({SEARCH})>]      text to find
//! [<({REPLACEWITH})>] replacement text
//! [<({END})>]
//! ```
//!
//! The scanner looks for marker literals in sequence instead of running a
//! backtracking pattern, so malformed input can never produce a partial match.
//! A candidate starts at a START marker and may not extend past the next
//! START marker; if SEARCH, REPLACEWITH or END is missing inside that window
//! the candidate is dropped and scanning picks up at the next START.

use crate::fingerprint::{fingerprint, Fingerprint};
use serde::Serialize;
use std::iter::FusedIterator;

pub const START_MARKER: &str = "[<({START})>]";
pub const SEARCH_MARKER: &str = "[<({SEARCH})>]";
pub const REPLACE_MARKER: &str = "[<({REPLACEWITH})>]";
pub const END_MARKER: &str = "[<({END})>]";

/// One well-formed block found in a text snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRecord {
    /// Target file path, trimmed
    pub file_path: String,
    /// Text to search for, surrounding whitespace trimmed
    pub search_content: String,
    /// Replacement text, surrounding whitespace trimmed
    pub replace_content: String,
    /// The full matched text from START through END
    pub raw_span: String,
}

impl BlockRecord {
    /// Dedup key of this block
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.raw_span)
    }
}

/// Scan `text` for blocks.
///
/// The returned iterator is lazy and borrows `text`; calling this again
/// restarts from the beginning and yields the same records.
pub fn extract_blocks(text: &str) -> Blocks<'_> {
    Blocks { text, pos: 0 }
}

/// Iterator over the blocks in a text snapshot
#[derive(Debug, Clone)]
pub struct Blocks<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = BlockRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = match self.text[self.pos..].find(START_MARKER) {
                Some(offset) => self.pos + offset,
                None => {
                    self.pos = self.text.len();
                    return None;
                }
            };

            let body_start = start + START_MARKER.len();
            let window_end = self.text[body_start..]
                .find(START_MARKER)
                .map(|offset| body_start + offset)
                .unwrap_or(self.text.len());

            match parse_candidate(&self.text[body_start..window_end]) {
                Some(parsed) => {
                    let span_end = body_start + parsed.consumed;
                    self.pos = span_end;
                    return Some(BlockRecord {
                        file_path: parsed.file_path.to_string(),
                        search_content: parsed.search_content.to_string(),
                        replace_content: parsed.replace_content.to_string(),
                        raw_span: self.text[start..span_end].to_string(),
                    });
                }
                None => {
                    self.pos = window_end;
                }
            }
        }
    }
}

impl FusedIterator for Blocks<'_> {}

struct ParsedCandidate<'a> {
    file_path: &'a str,
    search_content: &'a str,
    replace_content: &'a str,
    /// Bytes of the window consumed, up to and including the END marker
    consumed: usize,
}

/// Parse the text following a START marker, bounded by the next START
fn parse_candidate(window: &str) -> Option<ParsedCandidate<'_>> {
    let search_at = window.find(SEARCH_MARKER)?;
    let search_body = search_at + SEARCH_MARKER.len();

    let replace_at = search_body + window[search_body..].find(REPLACE_MARKER)?;
    let replace_body = replace_at + REPLACE_MARKER.len();

    let end_at = replace_body + window[replace_body..].find(END_MARKER)?;

    Some(ParsedCandidate {
        file_path: window[..search_at].trim(),
        search_content: window[search_body..replace_at].trim(),
        replace_content: window[replace_body..end_at].trim(),
        consumed: end_at + END_MARKER.len(),
    })
}
