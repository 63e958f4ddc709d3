//! Error types for every phase of a research session.
//!
//! Capability errors (search, fetch, generation, storage) stay local to the
//! component that hit them. Only [`ResearchError`] crosses the
//! [`Coordinator::execute`](crate::research::Coordinator::execute) boundary.

use std::time::Duration;
use thiserror::Error;

/// Failures from the search capability.
///
/// A search failure never escapes a research task: it is turned into a
/// failed [`ResearchResult`](crate::types::ResearchResult).
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    #[error("Failed to perform web search: {0}")]
    SearchFailed(String),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Unauthorized - check the search API key")]
    Unauthorized,

    #[error("Search request timed out")]
    Timeout,

    #[error("HTTP error ({0}): {1}")]
    Http(u16, String),

    #[error("Failed to parse search response: {0}")]
    Parse(String),

    #[error("No search results found for query: {0}")]
    NoResults(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl SearchError {
    /// Transient errors worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::Timeout | SearchError::RateLimited | SearchError::Network(_)
        ) || matches!(self, SearchError::Http(status, _) if *status >= 500)
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SearchError::Timeout
        } else if e.is_decode() {
            SearchError::Parse(e.to_string())
        } else {
            SearchError::Network(e.to_string())
        }
    }
}

/// Failures from the fetch capability. Always local to one candidate.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error ({0}) fetching {1}")]
    Http(u16, String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

/// Failures from the text-generation capability.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Text generation backend unreachable: {0}")]
    Unreachable(String),

    #[error("Text generation returned an empty response")]
    EmptyResponse,

    #[error("Failed to build text generation client for {0}")]
    Client(String),
}

/// Failures from durable storage.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures from the query refiner.
#[derive(Error, Debug)]
pub enum RefineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed refinement response: {0}")]
    MalformedResponse(String),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

/// Errors surfaced to callers of a research session.
///
/// Each variant names the phase that failed. A caller either gets a complete
/// session with a report or one of these, never a truncated report.
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Invalid research request: {0}")]
    InvalidInput(String),

    #[error("Query refinement failed: {0}")]
    Refinement(#[source] RefineError),

    #[error("Report synthesis failed: {0}")]
    Synthesis(#[source] GenerationError),

    #[error("Research session exceeded its {0:?} deadline")]
    SessionTimeout(Duration),

    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<RefineError> for ResearchError {
    fn from(e: RefineError) -> Self {
        match e {
            RefineError::InvalidInput(msg) => ResearchError::InvalidInput(msg),
            other => ResearchError::Refinement(other),
        }
    }
}
