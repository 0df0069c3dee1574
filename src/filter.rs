//! Rejection of blocks that look flattened.
//!
//! Some pages render code blocks so that line breaks are lost in the visible
//! text. A long search string with no line break is almost always such a
//! casualty and would never match the file on disk, so it is not sent.

use crate::extractor::BlockRecord;

/// Longest single-line search text accepted by default
pub const DEFAULT_MAX_SINGLE_LINE_CHARS: usize = 60;

/// Heuristic filter for suspicious blocks
#[derive(Debug, Clone, Copy)]
pub struct ValidityFilter {
    max_single_line_chars: usize,
}

impl ValidityFilter {
    pub fn new(max_single_line_chars: usize) -> Self {
        Self {
            max_single_line_chars,
        }
    }

    /// `true` when the block's search text is longer than the limit and
    /// has no line break
    pub fn is_suspicious(&self, block: &BlockRecord) -> bool {
        let search = &block.search_content;
        !search.contains('\n') && text_len(search) > self.max_single_line_chars
    }

    pub fn max_single_line_chars(&self) -> usize {
        self.max_single_line_chars
    }
}

impl Default for ValidityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SINGLE_LINE_CHARS)
    }
}

/// Length as the page measures it, in UTF-16 code units
pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Check a block against the default limit
pub fn is_suspicious(block: &BlockRecord) -> bool {
    ValidityFilter::default().is_suspicious(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_search(search: &str) -> BlockRecord {
        BlockRecord {
            file_path: "a.rs".to_string(),
            search_content: search.to_string(),
            replace_content: "x".to_string(),
            raw_span: String::new(),
        }
    }

    #[test]
    fn test_61_chars_single_line_rejected() {
        assert!(is_suspicious(&with_search(&"a".repeat(61))));
    }

    #[test]
    fn test_60_chars_single_line_accepted() {
        assert!(!is_suspicious(&with_search(&"a".repeat(60))));
    }

    #[test]
    fn test_61_chars_with_line_break_accepted() {
        let search = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        assert_eq!(search.chars().count(), 61);
        assert!(!is_suspicious(&with_search(&search)));
    }

    #[test]
    fn test_counts_utf16_units_not_bytes() {
        // 60 two-byte chars = 120 bytes, still within the limit
        assert!(!is_suspicious(&with_search(&"é".repeat(60))));
        assert!(is_suspicious(&with_search(&"é".repeat(61))));
    }

    #[test]
    fn test_astral_chars_count_twice() {
        // Each is one char but two UTF-16 units
        assert_eq!(text_len("𝄞"), 2);
        assert!(!is_suspicious(&with_search(&"𝄞".repeat(30))));
        assert!(is_suspicious(&with_search(&"𝄞".repeat(31))));
    }

    #[test]
    fn test_custom_limit() {
        let filter = ValidityFilter::new(10);
        assert!(filter.is_suspicious(&with_search("eleven char")));
        assert!(!filter.is_suspicious(&with_search("ten chars!")));
    }
}
