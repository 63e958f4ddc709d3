//! # Data Model
//!
//! Immutable value records passed between the research components.
//! Everything that crosses the task → coordinator boundary is a
//! [`BoundedSummary`]; full page content stays inside the task that fetched it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// REQUEST
// =============================================================================

/// One user research request. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub original_query: String,
}

impl ResearchRequest {
    pub fn new(original_query: impl Into<String>) -> Self {
        Self {
            original_query: original_query.into(),
        }
    }
}

// =============================================================================
// QUERY TYPE TAG
// =============================================================================

/// Which research angle a task covers.
///
/// Serialized as `primary`, `orthogonal_1`, `orthogonal_2`, ... which is also
/// the storage key suffix for that task's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum QueryType {
    Primary,
    /// 1-based position in [`QuerySet::orthogonal`]
    Orthogonal(usize),
}

impl QueryType {
    /// Tags in launch order for a fan-out of the given width.
    pub fn launch_order(width: usize) -> Vec<QueryType> {
        std::iter::once(QueryType::Primary)
            .chain((1..=width).map(QueryType::Orthogonal))
            .collect()
    }

    /// Human readable heading used in reports.
    pub fn heading(&self) -> String {
        match self {
            QueryType::Primary => "Primary Research".to_string(),
            QueryType::Orthogonal(1) => "Complementary Research".to_string(),
            QueryType::Orthogonal(n) => format!("Additional Perspective {}", n - 1),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::Primary => write!(f, "primary"),
            QueryType::Orthogonal(n) => write!(f, "orthogonal_{}", n),
        }
    }
}

impl From<QueryType> for String {
    fn from(tag: QueryType) -> Self {
        tag.to_string()
    }
}

impl TryFrom<String> for QueryType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "primary" {
            return Ok(QueryType::Primary);
        }
        s.strip_prefix("orthogonal_")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .map(QueryType::Orthogonal)
            .ok_or_else(|| format!("unknown query type: {}", s))
    }
}

// =============================================================================
// QUERY SET
// =============================================================================

/// The refined queries for one session: one primary plus `width` orthogonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySet {
    pub original: String,
    pub primary: String,
    pub orthogonal: Vec<String>,
    /// Free-text rationale per query, keyed by query type tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<BTreeMap<String, String>>,
}

impl QuerySet {
    /// All queries paired with their tags, in launch order.
    pub fn tagged(&self) -> Vec<(QueryType, &str)> {
        std::iter::once((QueryType::Primary, self.primary.as_str()))
            .chain(
                self.orthogonal
                    .iter()
                    .enumerate()
                    .map(|(i, q)| (QueryType::Orthogonal(i + 1), q.as_str())),
            )
            .collect()
    }

    pub fn width(&self) -> usize {
        self.orthogonal.len()
    }

    /// Query that was assigned to `tag`, if any.
    pub fn query_for(&self, tag: QueryType) -> Option<&str> {
        match tag {
            QueryType::Primary => Some(self.primary.as_str()),
            QueryType::Orthogonal(n) => self.orthogonal.get(n.checked_sub(1)?).map(String::as_str),
        }
    }

    pub fn rationale_for(&self, tag: QueryType) -> Option<&str> {
        self.rationale.as_ref()?.get(&tag.to_string()).map(String::as_str)
    }

    /// Pairs of tags whose queries coincide (case and whitespace insensitive).
    ///
    /// Duplicates are reported, not repaired.
    pub fn duplicate_queries(&self) -> Vec<(QueryType, QueryType)> {
        let tagged = self.tagged();
        let normalize = |q: &str| q.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let mut dupes = Vec::new();
        for (i, (tag_a, a)) in tagged.iter().enumerate() {
            for (tag_b, b) in tagged.iter().skip(i + 1) {
                if normalize(*a) == normalize(*b) {
                    dupes.push((*tag_a, *tag_b));
                }
            }
        }
        dupes
    }
}

// =============================================================================
// SOURCES AND ARTICLES
// =============================================================================

/// One hit from the search capability. `rank` is 1-based engine order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub rank: u32,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A candidate plus whatever content was fetched for it.
///
/// Owned by the task that fetched it and written once to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullArticle {
    pub candidate: SourceCandidate,
    pub content: String,
    pub content_length: usize,
    pub fetch_succeeded: bool,
}

impl FullArticle {
    pub fn fetched(candidate: SourceCandidate, content: String) -> Self {
        let content_length = content.chars().count();
        Self {
            candidate,
            content,
            content_length,
            fetch_succeeded: true,
        }
    }

    pub fn failed(candidate: SourceCandidate) -> Self {
        Self {
            candidate,
            content: String::new(),
            content_length: 0,
            fetch_succeeded: false,
        }
    }
}

/// Size-capped view of a [`FullArticle`], safe to hand to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedSummary {
    pub rank: u32,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub content_preview: String,
    pub content_length: usize,
    pub fetch_succeeded: bool,
}

// =============================================================================
// RESULTS
// =============================================================================

/// Terminal state of a research task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed { error: String },
}

/// What one research task hands back to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub query_type: QueryType,
    pub query: String,
    pub summaries: Vec<BoundedSummary>,
    pub outcome: TaskOutcome,
}

impl ResearchResult {
    pub fn success(query_type: QueryType, query: impl Into<String>, summaries: Vec<BoundedSummary>) -> Self {
        Self {
            query_type,
            query: query.into(),
            summaries,
            outcome: TaskOutcome::Succeeded,
        }
    }

    /// A failed result never carries summaries.
    pub fn failure(query_type: QueryType, query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            query_type,
            query: query.into(),
            summaries: Vec::new(),
            outcome: TaskOutcome::Failed { error: error.into() },
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Succeeded)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            TaskOutcome::Succeeded => None,
            TaskOutcome::Failed { error } => Some(error),
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Everything one request produced. Returned to the caller by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: String,
    pub query_set: QuerySet,
    /// Launch order: primary, orthogonal_1, orthogonal_2, ...
    pub results: Vec<ResearchResult>,
    pub report: Option<String>,
}

impl ResearchSession {
    pub fn result_for(&self, tag: QueryType) -> Option<&ResearchResult> {
        self.results.iter().find(|r| r.query_type == tag)
    }

    pub fn total_sources(&self) -> usize {
        self.results.iter().map(|r| r.summaries.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_set() -> QuerySet {
        QuerySet {
            original: "rust async".into(),
            primary: "rust async runtime".into(),
            orthogonal: vec!["tokio internals".into(), "async cancellation".into()],
            rationale: None,
        }
    }

    #[test]
    fn test_query_type_tags() {
        assert_eq!(QueryType::Primary.to_string(), "primary");
        assert_eq!(QueryType::Orthogonal(2).to_string(), "orthogonal_2");
        assert_eq!("orthogonal_3".parse::<QueryType>(), Ok(QueryType::Orthogonal(3)));
        assert!("orthogonal_0".parse::<QueryType>().is_err());
        assert!("secondary".parse::<QueryType>().is_err());
    }

    #[test]
    fn test_query_type_serializes_as_tag() {
        let json = serde_json::to_string(&QueryType::Orthogonal(1)).unwrap();
        assert_eq!(json, "\"orthogonal_1\"");
        let back: QueryType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, QueryType::Orthogonal(1));
    }

    #[test]
    fn test_launch_order() {
        assert_eq!(
            QueryType::launch_order(2),
            vec![QueryType::Primary, QueryType::Orthogonal(1), QueryType::Orthogonal(2)]
        );
        assert_eq!(QueryType::launch_order(0), vec![QueryType::Primary]);
    }

    #[test]
    fn test_query_set_tagged() {
        let set = query_set();
        let tagged = set.tagged();
        assert_eq!(tagged.len(), 3);
        assert_eq!(tagged[0], (QueryType::Primary, "rust async runtime"));
        assert_eq!(tagged[2], (QueryType::Orthogonal(2), "async cancellation"));
        assert_eq!(set.query_for(QueryType::Orthogonal(1)), Some("tokio internals"));
        assert_eq!(set.query_for(QueryType::Orthogonal(5)), None);
    }

    #[test]
    fn test_duplicate_queries_reported() {
        let mut set = query_set();
        assert!(set.duplicate_queries().is_empty());

        set.orthogonal[0] = "Rust  Async runtime".into();
        assert_eq!(
            set.duplicate_queries(),
            vec![(QueryType::Primary, QueryType::Orthogonal(1))]
        );
    }

    #[test]
    fn test_failed_result_has_no_summaries() {
        let result = ResearchResult::failure(QueryType::Primary, "q", "search exploded");
        assert!(!result.succeeded());
        assert!(result.summaries.is_empty());
        assert_eq!(result.error(), Some("search exploded"));
    }

    #[test]
    fn test_full_article_constructors() {
        let candidate = SourceCandidate {
            rank: 1,
            title: "t".into(),
            url: "https://a.example".into(),
            snippet: "s".into(),
        };
        let ok = FullArticle::fetched(candidate.clone(), "héllo".into());
        assert_eq!(ok.content_length, 5);
        assert!(ok.fetch_succeeded);

        let failed = FullArticle::failed(candidate);
        assert_eq!(failed.content_length, 0);
        assert!(failed.content.is_empty());
    }
}
