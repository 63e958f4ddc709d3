//! Research task: search one query, fetch every candidate, bound each article.
//!
//! ```text
//! search ──► fetch × N (concurrent, per-call timeout) ──► reorder by engine position
//!        ──► bound each ──► persist full articles ──► return bounded result
//! ```

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bounder::SummaryBounds;
use super::progress::ProgressEvent;
use crate::context::SessionContext;
use crate::error::{FetchError, ResearchError, SearchError};
use crate::storage::results_key;
use crate::tools::{Fetcher, SearchProvider};
use crate::types::{FullArticle, QueryType, ResearchResult, SourceCandidate};

/// Smallest and largest candidate count a task accepts.
pub const RESULT_COUNT_RANGE: std::ops::RangeInclusive<usize> = 1..=50;

/// Tuning for a single research task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskOptions {
    pub bounds: SummaryBounds,
    /// Upper bound on one fetch; a timed-out fetch counts as a failed fetch
    pub fetch_timeout: Duration,
    /// How many fetches run at once within one task
    pub fetch_concurrency: usize,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            bounds: SummaryBounds::default(),
            fetch_timeout: Duration::from_secs(30),
            fetch_concurrency: 4,
        }
    }
}

/// Full-detail record written to storage once per task.
#[derive(Debug, Serialize)]
struct TaskRecord<'a> {
    query_type: QueryType,
    query: &'a str,
    search_provider: &'a str,
    succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    num_articles: usize,
    articles: &'a [FullArticle],
    #[serde(skip_serializing_if = "Option::is_none")]
    search_metadata: Option<&'a Value>,
    completed_at: String,
}

/// Runs one search-and-summarize task against the injected capabilities.
#[derive(Clone)]
pub struct ResearchTask {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn Fetcher>,
    options: TaskOptions,
}

impl ResearchTask {
    pub fn new(search: Arc<dyn SearchProvider>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            search,
            fetcher,
            options: TaskOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    /// Research `query` and return bounded summaries in search engine order.
    ///
    /// A failed or empty search yields a failed [`ResearchResult`], not an
    /// error. The only `Err` is an out-of-range `result_count`.
    pub async fn run(
        &self,
        ctx: &SessionContext,
        query: &str,
        query_type: QueryType,
        result_count: usize,
    ) -> Result<ResearchResult, ResearchError> {
        if !RESULT_COUNT_RANGE.contains(&result_count) {
            return Err(ResearchError::InvalidInput(format!(
                "result count must be between {} and {}, got {}",
                RESULT_COUNT_RANGE.start(),
                RESULT_COUNT_RANGE.end(),
                result_count
            )));
        }

        info!(query_type = %query_type, query = %query, provider = self.search.name(), "Research task started");
        ctx.emit(ProgressEvent::TaskStarted {
            query_type,
            query: query.to_string(),
        });

        let response = match self.search.search(query, result_count).await {
            Ok(response) if response.candidates.is_empty() => {
                Err(SearchError::NoResults(query.to_string()))
            }
            other => other,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(query_type = %query_type, error = %e, "Search failed");
                let result = ResearchResult::failure(query_type, query, e.to_string());
                self.persist(ctx, &result, &[], None).await;
                ctx.emit(ProgressEvent::TaskFinished {
                    query_type,
                    succeeded: false,
                    sources: 0,
                });
                return Ok(result);
            }
        };

        let mut candidates = response.candidates;
        candidates.truncate(result_count);
        info!(query_type = %query_type, count = candidates.len(), "Fetching candidates");

        let articles = self.fetch_all(ctx, query_type, candidates).await;
        let summaries = articles.iter().map(|a| self.options.bounds.apply(a)).collect();
        let result = ResearchResult::success(query_type, query, summaries);

        self.persist(ctx, &result, &articles, response.metadata.as_ref()).await;

        let fetched = articles.iter().filter(|a| a.fetch_succeeded).count();
        info!(
            query_type = %query_type,
            articles = articles.len(),
            fetched,
            "Research task completed"
        );
        ctx.emit(ProgressEvent::TaskFinished {
            query_type,
            succeeded: true,
            sources: articles.len(),
        });

        Ok(result)
    }

    /// Fetch every candidate, at most `fetch_concurrency` at a time.
    ///
    /// Completion order is arbitrary; the returned articles keep the engine order.
    async fn fetch_all(
        &self,
        ctx: &SessionContext,
        query_type: QueryType,
        candidates: Vec<SourceCandidate>,
    ) -> Vec<FullArticle> {
        let concurrency = self.options.fetch_concurrency.max(1);

        let mut articles: Vec<(usize, FullArticle)> = stream::iter(candidates.into_iter().enumerate())
            .map(|(position, candidate)| async move {
                let article = match self.fetch_one(&candidate.url).await {
                    Ok(content) => FullArticle::fetched(candidate, content),
                    Err(e) => {
                        debug!(query_type = %query_type, url = %candidate.url, error = %e, "Fetch failed");
                        FullArticle::failed(candidate)
                    }
                };
                ctx.emit(ProgressEvent::SourceFetched {
                    query_type,
                    rank: article.candidate.rank,
                    succeeded: article.fetch_succeeded,
                });
                (position, article)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        articles.sort_by_key(|(position, _)| *position);
        articles.into_iter().map(|(_, article)| article).collect()
    }

    async fn fetch_one(&self, url: &str) -> Result<String, FetchError> {
        let timeout = self.options.fetch_timeout;
        tokio::time::timeout(timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }

    /// Write the full-detail record. Failure is logged, never propagated.
    async fn persist(
        &self,
        ctx: &SessionContext,
        result: &ResearchResult,
        articles: &[FullArticle],
        search_metadata: Option<&Value>,
    ) {
        let record = TaskRecord {
            query_type: result.query_type,
            query: &result.query,
            search_provider: self.search.name(),
            succeeded: result.succeeded(),
            error: result.error(),
            num_articles: articles.len(),
            articles,
            search_metadata,
            completed_at: Utc::now().to_rfc3339(),
        };

        let key = results_key(result.query_type);
        if let Err(e) = ctx.save(&key, &record).await {
            warn!(key = %key, error = %e, "Failed to persist research results");
        }
    }
}
