//! HTTP fetch capability: download a page and reduce it to readable text.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::debug;

use super::{Fetcher, USER_AGENT};
use crate::error::FetchError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fetches pages over HTTP. Every request is bounded by its own timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16(), url.to_string()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let text = if content_type.contains("html") {
            html_to_text(&body)
        } else if content_type.starts_with("text/") || content_type.contains("json") || content_type.contains("xml") {
            collapse_whitespace(&body)
        } else {
            return Err(FetchError::UnsupportedContent(content_type));
        };

        debug!(url = %url, chars = text.chars().count(), "Fetched page");
        Ok(text)
    }
}

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "svg", "template"];

/// Containers that usually hold the article body, most specific first.
const MAIN_CONTENT_SELECTORS: &[&str] = &["article", "main", "[role='main']"];

/// A main-content container shorter than this is navigation chrome.
const MIN_MAIN_CONTENT_CHARS: usize = 100;

/// Reduce an HTML document to its visible text.
///
/// # Rust Concept: Parse, don't pattern-match
///
/// The document goes through a real HTML parser, so attribute values
/// containing `>` and numeric entities like `&#8217;` come out right.
/// The article or main container wins when it carries enough text;
/// otherwise the whole document is used. Hidden subtrees are skipped.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    main_content(&document).unwrap_or_else(|| visible_text(document.root_element()))
}

fn main_content(document: &Html) -> Option<String> {
    MAIN_CONTENT_SELECTORS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .filter_map(|selector| document.select(&selector).next())
        .map(visible_text)
        .find(|text| text.chars().count() > MIN_MAIN_CONTENT_CHARS)
}

fn visible_text(root: ElementRef<'_>) -> String {
    let pieces: Vec<&str> = root
        .descendants()
        .filter(|node| !node.ancestors().any(|ancestor| is_hidden(ancestor.value())))
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .collect();
    collapse_whitespace(&pieces.join(" "))
}

fn is_hidden(node: &Node) -> bool {
    matches!(node, Node::Element(element) if HIDDEN_ELEMENTS.contains(&element.name()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
