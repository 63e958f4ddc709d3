//! Serper.dev search capability.
//!
//! Google results through the Serper API, with retry and exponential backoff
//! on transient failures (timeouts, rate limits, 5xx).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{rank_candidates, RawHit, SearchProvider, SearchResponse};
use crate::error::SearchError;

const DEFAULT_ENDPOINT: &str = "https://google.serper.dev/search";

/// Default timeout for Serper API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 1000;

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperHit>,
    #[serde(rename = "searchParameters", default)]
    search_parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SerperHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Serper search client.
///
/// # Example
/// ```ignore
/// let search = SerperSearch::new(api_key).with_max_retries(1);
/// let response = search.search("quantum error correction", 10).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SerperSearch {
    api_key: String,
    client: Client,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    async fn execute_with_retry(&self, request: &SerperRequest<'_>) -> Result<SerperResponse, SearchError> {
        let mut attempt = 0;
        loop {
            match self.execute_single_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_base_delay * 2u32.pow(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Serper request failed, will retry");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_single_request(&self, request: &SerperRequest<'_>) -> Result<SerperResponse, SearchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<SerperResponse>()
                .await
                .map_err(|e| SearchError::Parse(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(SearchError::Unauthorized),
            429 => Err(SearchError::RateLimited),
            code => Err(SearchError::Http(code, error_text)),
        }
    }
}

#[async_trait]
impl SearchProvider for SerperSearch {
    async fn search(&self, query: &str, count: usize) -> Result<SearchResponse, SearchError> {
        info!(query = %query, count, "Searching");

        let request = SerperRequest { q: query, num: count };
        let response = self.execute_with_retry(&request).await?;

        let hits = response.organic.into_iter().map(|hit| RawHit {
            title: hit.title,
            url: hit.link,
            snippet: hit.snippet,
        });
        let candidates = rank_candidates(hits, count);
        debug!(query = %query, found = candidates.len(), "Serper search completed");

        Ok(SearchResponse {
            candidates,
            metadata: response.search_parameters,
        })
    }

    fn name(&self) -> &str {
        "serper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SerperSearch {
        SerperSearch::new("test-key")
            .with_endpoint(format!("{}/search", server.uri()))
            .with_retry_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_search_parses_organic_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-API-KEY", "test-key"))
            .and(body_json(json!({"q": "rust", "num": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "searchParameters": {"q": "rust", "type": "search"},
                "organic": [
                    {"title": "Rust", "link": "https://www.rust-lang.org", "snippet": "A language", "position": 1},
                    {"title": "No link", "snippet": "dropped", "position": 2},
                    {"title": "Book", "link": "https://doc.rust-lang.org/book", "snippet": "The book", "position": 3}
                ]
            })))
            .mount(&server)
            .await;

        let response = client(&server).search("rust", 3).await.unwrap();

        assert_eq!(response.candidates.len(), 2);
        assert_eq!(response.candidates[0].title, "Rust");
        assert_eq!(response.candidates[1].rank, 2);
        assert_eq!(response.candidates[1].url, "https://doc.rust-lang.org/book");
        assert_eq!(response.metadata.unwrap()["type"], "search");
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).search("rust", 3).await.unwrap_err();
        assert!(matches!(err, SearchError::Unauthorized));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).search("rust", 3).await.unwrap_err();
        assert!(matches!(err, SearchError::Http(503, _)));
    }

    #[tokio::test]
    async fn test_empty_organic_is_not_an_error_here() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"organic": []})))
            .mount(&server)
            .await;

        let response = client(&server).search("rust", 3).await.unwrap();
        assert!(response.candidates.is_empty());
        assert!(response.metadata.is_none());
    }
}
