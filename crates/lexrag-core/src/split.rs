//! Paragraph-boundary text splitters.
//!
//! A [`TextSplitter`] turns a document body into ordered parts that become
//! chunks. Both implementations split on paragraph boundaries (`\n\n`),
//! drop empty and whitespace-only paragraphs, and hard-split paragraphs
//! that exceed the character budget at the nearest newline or space.
//!
//! # Budget
//!
//! Budgets are given in tokens and converted to characters with a
//! 4 chars/token ratio.
//!
//! # Example
//!
//! ```rust
//! use lexrag_core::split::{ParagraphSplitter, TextSplitter};
//!
//! let parts = ParagraphSplitter::new(700).split("Para1.\n\nPara2.\n\nPara3.");
//! assert_eq!(parts, vec!["Para1.", "Para2.", "Para3."]);
//! ```

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Splits text into an ordered sequence of non-empty parts.
///
/// Implementations must be deterministic for identical input, and must
/// return no parts for empty or whitespace-only text.
pub trait TextSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// One part per paragraph.
#[derive(Debug, Clone)]
pub struct ParagraphSplitter {
    max_chars: usize,
}

impl ParagraphSplitter {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_chars: max_tokens.max(1) * CHARS_PER_TOKEN,
        }
    }
}

impl TextSplitter for ParagraphSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let mut parts = Vec::new();
        for para in text.split("\n\n") {
            let trimmed = para.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.len() > self.max_chars {
                hard_split(trimmed, self.max_chars, &mut parts);
            } else {
                parts.push(trimmed.to_string());
            }
        }
        parts
    }
}

/// Packs consecutive paragraphs into parts up to the budget.
///
/// 1. Accumulate paragraphs into a buffer until adding the next one would
///    exceed `max_chars`.
/// 2. When exceeded, flush the buffer as a part and start a new one.
/// 3. A single paragraph over `max_chars` is hard-split on its own.
#[derive(Debug, Clone)]
pub struct PackedSplitter {
    max_chars: usize,
}

impl PackedSplitter {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_chars: max_tokens.max(1) * CHARS_PER_TOKEN,
        }
    }
}

impl TextSplitter for PackedSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current_buf = String::new();

        for para in text.split("\n\n") {
            let trimmed = para.trim();
            if trimmed.is_empty() {
                continue;
            }

            let would_be = if current_buf.is_empty() {
                trimmed.len()
            } else {
                current_buf.len() + 2 + trimmed.len()
            };

            if would_be > self.max_chars && !current_buf.is_empty() {
                parts.push(std::mem::take(&mut current_buf));
            }

            if trimmed.len() > self.max_chars {
                hard_split(trimmed, self.max_chars, &mut parts);
            } else {
                if !current_buf.is_empty() {
                    current_buf.push_str("\n\n");
                }
                current_buf.push_str(trimmed);
            }
        }

        if !current_buf.is_empty() {
            parts.push(current_buf);
        }

        parts
    }
}

/// Split an oversized paragraph into pieces of at most `max_chars` bytes,
/// preferring newline then space boundaries. Pieces are trimmed and empty
/// pieces are skipped.
fn hard_split(paragraph: &str, max_chars: usize, parts: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let limit = if limit == 0 {
            next_char_boundary(remaining)
        } else {
            limit
        };
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            parts.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Byte index just past the first char, so a split always makes progress.
fn next_char_boundary(s: &str) -> usize {
    s.char_indices()
        .nth(1)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
