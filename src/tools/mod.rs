//! # Tools Module
//!
//! The two external capabilities a research task depends on:
//! - [`SearchProvider`]: query → ranked [`SourceCandidate`]s
//! - [`Fetcher`]: URL → page text
//!
//! Real implementations talk HTTP; tests inject stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FetchError, SearchError};
use crate::types::SourceCandidate;

mod duckduckgo;
mod fetch;
mod serper;

pub use duckduckgo::DuckDuckGoSearch;
pub use fetch::{html_to_text, HttpFetcher};
pub use serper::SerperSearch;

/// Browser-like user agent shared by the HTTP clients.
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// What a search returns: candidates in engine relevance order plus any
/// metadata the engine reported about the search itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub candidates: Vec<SourceCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl SearchResponse {
    pub fn new(candidates: Vec<SourceCandidate>) -> Self {
        Self {
            candidates,
            metadata: None,
        }
    }
}

/// Search capability.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query`, asking for up to `count` candidates.
    async fn search(&self, query: &str, count: usize) -> Result<SearchResponse, SearchError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Fetch capability. Each URL succeeds or fails independently.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// A raw search hit before ranking.
#[derive(Debug, Clone)]
pub(crate) struct RawHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Turn raw hits into ranked candidates.
///
/// Hits without a URL are dropped, the rest keep engine order, are capped at
/// `count` and get ranks `1..=n`.
pub(crate) fn rank_candidates(hits: impl IntoIterator<Item = RawHit>, count: usize) -> Vec<SourceCandidate> {
    hits.into_iter()
        .filter(|hit| !hit.url.trim().is_empty())
        .take(count)
        .enumerate()
        .map(|(i, hit)| SourceCandidate {
            rank: (i + 1) as u32,
            title: if hit.title.trim().is_empty() {
                "No title".to_string()
            } else {
                hit.title
            },
            url: hit.url,
            snippet: hit.snippet,
        })
        .collect()
}
