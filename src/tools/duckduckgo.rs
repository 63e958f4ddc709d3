//! DuckDuckGo search capability.
//!
//! Keyless fallback used when no Serper API key is configured.
//! DuckDuckGo has no free web search API, so results are scraped from the
//! HTML endpoint.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{rank_candidates, RawHit, SearchProvider, SearchResponse, USER_AGENT};
use crate::error::SearchError;

const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Pause before each request; the HTML endpoint rate limits aggressively.
const REQUEST_DELAY: Duration = Duration::from_millis(500);

/// Web search through DuckDuckGo's HTML results page.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Point at a different HTML endpoint (mock servers in tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_results_page(&self, query: &str) -> Result<String, SearchError> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        debug!(url = %url, "Fetching search results");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::SearchFailed(format!("HTTP {}", status)));
        }

        Ok(response.text().await?)
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, count: usize) -> Result<SearchResponse, SearchError> {
        info!(query = %query, "Performing web search");

        tokio::time::sleep(REQUEST_DELAY).await;

        let body = self.fetch_results_page(query).await?;
        let candidates = rank_candidates(parse_html(&body, count), count);

        if candidates.is_empty() {
            warn!(query = %query, "No search results found");
        } else {
            info!(query = %query, count = candidates.len(), "Search completed");
        }

        Ok(SearchResponse::new(candidates))
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

/// Parse DuckDuckGo HTML into hits.
///
/// The page layout shifts over time, so several extraction strategies run in
/// order until `max` distinct URLs have been collected.
fn parse_html(html: &str, max: usize) -> Vec<RawHit> {
    let mut hits = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |hits: &mut Vec<RawHit>, url: String, snippet: &str| {
        if seen.insert(url.clone()) {
            hits.push(RawHit {
                title: extract_domain(&url).unwrap_or_else(|| "Result".to_string()),
                url,
                snippet: snippet.to_string(),
            });
        }
    };

    // Redirect links carry the target in the uddg parameter
    for segment in html.split("uddg=").skip(1) {
        if hits.len() >= max {
            break;
        }
        let Some(end) = segment.find(['&', '"', '\'']) else {
            continue;
        };
        if let Ok(url) = urlencoding::decode(&segment[..end]) {
            let url = url.into_owned();
            if url.starts_with("http") && !url.contains("duckduckgo.com") {
                push(&mut hits, url, "Search result from DuckDuckGo");
            }
        }
    }

    // Visible result URLs
    if hits.len() < max {
        for segment in html.split("result__url").skip(1) {
            if hits.len() >= max {
                break;
            }
            let Some(href_start) = segment.find("href=\"") else {
                continue;
            };
            let after_href = &segment[href_start + 6..];
            let Some(href_end) = after_href.find('"') else {
                continue;
            };
            let href = &after_href[..href_end];
            let url = if let Some(rest) = href.strip_prefix("//") {
                format!("https://{}", rest)
            } else if href.starts_with("http") {
                href.to_string()
            } else {
                continue;
            };
            if !url.contains("duckduckgo.com") {
                push(&mut hits, url, "Search result");
            }
        }
    }

    hits.truncate(max);
    hits
}

/// Extract the domain name from a URL.
fn extract_domain(url: &str) -> Option<String> {
    url.split("//")
        .nth(1)?
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
