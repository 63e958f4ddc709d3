//! Summary bounder: cuts a [`FullArticle`] down to a fixed-size [`BoundedSummary`].
//!
//! Cuts are by character count, not bytes, so multi-byte text never splits
//! inside a code point. No word-boundary handling.

use crate::types::{BoundedSummary, FullArticle};

/// Default `content_preview` budget in characters.
pub const DEFAULT_PREVIEW_CHARS: usize = 500;

/// Default `snippet` budget in characters.
pub const DEFAULT_SNIPPET_CHARS: usize = 300;

/// Character budgets applied by [`bound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryBounds {
    pub preview_chars: usize,
    pub snippet_chars: usize,
}

impl Default for SummaryBounds {
    fn default() -> Self {
        Self {
            preview_chars: DEFAULT_PREVIEW_CHARS,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

impl SummaryBounds {
    pub fn apply(&self, article: &FullArticle) -> BoundedSummary {
        bound(article, self.preview_chars, self.snippet_chars)
    }
}

/// Bound one article. Pure: the same inputs always give the same summary.
///
/// A failed fetch has empty content and so yields an empty preview.
pub fn bound(article: &FullArticle, preview_chars: usize, snippet_chars: usize) -> BoundedSummary {
    BoundedSummary {
        rank: article.candidate.rank,
        title: article.candidate.title.clone(),
        url: article.candidate.url.clone(),
        snippet: truncate_chars(&article.candidate.snippet, snippet_chars),
        content_preview: truncate_chars(&article.content, preview_chars),
        content_length: article.content_length,
        fetch_succeeded: article.fetch_succeeded,
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
