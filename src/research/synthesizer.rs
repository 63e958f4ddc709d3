//! Report synthesizer: bounded results → one markdown report.
//!
//! The model only writes prose. The report skeleton (one subsection per
//! result in launch order, failed angles called out, the deduplicated source
//! list) is assembled here, so it holds no matter what the model returns.

use chrono::Local;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::bounder::truncate_chars;
use super::prompts::ResearchPrompts;
use crate::error::GenerationError;
use crate::llm::{extract_json, GenerationRequest, TextGenerator};
use crate::types::{BoundedSummary, QuerySet, QueryType, ResearchResult};

/// How much of each result reaches the generation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// Top summaries per result included in the prompt and listed as notable sources
    pub sources_per_result: usize,
    /// Preview budget per summary inside the prompt
    pub preview_chars: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            sources_per_result: 5,
            preview_chars: 300,
        }
    }
}

/// Prose returned by the model.
#[derive(Debug, Default)]
struct ReportProse {
    title: Option<String>,
    executive_summary: String,
    sections: BTreeMap<String, String>,
    conclusions: Option<String>,
}

#[derive(Clone)]
pub struct ReportSynthesizer {
    generator: Arc<dyn TextGenerator>,
    options: ReportOptions,
}

impl ReportSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            options: ReportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReportOptions) -> Self {
        self.options = options;
        self
    }

    /// Write the report for `results`.
    ///
    /// Fails only when the generator cannot be reached. Failed results,
    /// an empty reply and unparseable prose still produce a complete report.
    pub async fn synthesize(
        &self,
        original: &str,
        query_set: &QuerySet,
        results: &[ResearchResult],
    ) -> Result<String, GenerationError> {
        info!(results = results.len(), "Synthesizing research into final report");

        let digest = self.digest(original, query_set, results);
        let tags: Vec<QueryType> = results.iter().map(|r| r.query_type).collect();
        let request = GenerationRequest::new(
            ResearchPrompts::synthesizer_system(),
            ResearchPrompts::synthesizer(original, &digest, &tags),
        )
        .with_schema(ResearchPrompts::synthesizer_schema());

        let prose = match self.generator.generate(request).await {
            Ok(reply) => parse_prose(&reply),
            Err(GenerationError::EmptyResponse) => {
                warn!("Report prose was empty, rendering the report without it");
                ReportProse::default()
            }
            Err(e) => return Err(e),
        };

        let report = ReportView {
            original,
            query_set,
            results,
            prose: &prose,
            options: self.options,
        };
        Ok(report.to_string())
    }

    /// The bounded view of the session handed to the model.
    fn digest(&self, original: &str, query_set: &QuerySet, results: &[ResearchResult]) -> Value {
        let results: Vec<Value> = results
            .iter()
            .map(|result| {
                let sources: Vec<Value> = result
                    .summaries
                    .iter()
                    .take(self.options.sources_per_result)
                    .map(|s| {
                        json!({
                            "title": s.title,
                            "url": s.url,
                            "snippet": s.snippet,
                            "content_preview": truncate_chars(&s.content_preview, self.options.preview_chars),
                        })
                    })
                    .collect();
                json!({
                    "query_type": result.query_type,
                    "query": result.query,
                    "status": if result.succeeded() { "succeeded" } else { "failed" },
                    "num_articles": result.summaries.len(),
                    "sources": sources,
                })
            })
            .collect();

        json!({
            "original_query": original,
            "refined_queries": query_set,
            "results": results,
        })
    }
}

/// Parse the model's JSON prose; a non-JSON reply becomes the summary text.
fn parse_prose(reply: &str) -> ReportProse {
    let parsed = serde_json::from_str::<Value>(extract_json(reply))
        .ok()
        .filter(Value::is_object);

    let Some(value) = parsed else {
        warn!("Report prose was not JSON, using raw reply as summary");
        return ReportProse {
            executive_summary: reply.trim().to_string(),
            ..ReportProse::default()
        };
    };

    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let sections: BTreeMap<String, String> = value
        .get("sections")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.trim().to_string())))
                .collect()
        })
        .unwrap_or_default();

    ReportProse {
        title: text("title"),
        executive_summary: text("executive_summary").unwrap_or_default(),
        sections,
        conclusions: text("conclusions"),
    }
}

/// Every distinct URL across `results`, first-seen order, exact-match dedup.
pub fn consolidated_sources(results: &[ResearchResult]) -> Vec<&BoundedSummary> {
    let mut seen = HashSet::new();
    results
        .iter()
        .flat_map(|r| r.summaries.iter())
        .filter(|s| seen.insert(s.url.as_str()))
        .collect()
}

/// The fixed report layout over one session's data.
///
/// # Rust Concept: Display as a renderer
///
/// Implementing `fmt::Display` lets every `writeln!` propagate
/// `fmt::Error` with `?` instead of discarding it; `to_string()` collects
/// the result.
struct ReportView<'a> {
    original: &'a str,
    query_set: &'a QuerySet,
    results: &'a [ResearchResult],
    prose: &'a ReportProse,
    options: ReportOptions,
}

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.prose.title.as_deref().unwrap_or(self.original);
        writeln!(f, "# Research Report: {}\n", title)?;

        writeln!(f, "## Summary\n")?;
        if self.prose.executive_summary.is_empty() {
            writeln!(f, "_No summary was generated._\n")?;
        } else {
            writeln!(f, "{}\n", self.prose.executive_summary)?;
        }

        self.methodology(f)?;
        self.key_findings(f)?;

        writeln!(f, "## Synthesis & Conclusions\n")?;
        match &self.prose.conclusions {
            Some(conclusions) => writeln!(f, "{}\n", conclusions)?,
            None => writeln!(f, "_No conclusions were generated._\n")?,
        }

        writeln!(f, "## Sources & References\n")?;
        let sources = consolidated_sources(self.results);
        if sources.is_empty() {
            writeln!(f, "_No sources were found._")?;
        }
        for (i, summary) in sources.iter().enumerate() {
            writeln!(f, "{}. [{}]({})", i + 1, summary.title, summary.url)?;
        }

        write!(
            f,
            "\n---\n*Report generated on {}*\n",
            Local::now().format("%Y-%m-%d at %H:%M:%S")
        )
    }
}

impl ReportView<'_> {
    fn methodology(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summaries = || self.results.iter().flat_map(|r| r.summaries.iter());
        let total_sources = summaries().count();
        let fetched = summaries().filter(|s| s.fetch_succeeded).count();

        writeln!(f, "## Research Methodology\n")?;
        writeln!(f, "- **Original Query:** {}", self.original)?;
        writeln!(f, "- **Search Strategy:**")?;
        for (tag, query) in self.query_set.tagged() {
            match self.query_set.rationale_for(tag) {
                Some(why) => writeln!(f, "  - `{}`: {} ({})", tag, query, why)?,
                None => writeln!(f, "  - `{}`: {}", tag, query)?,
            }
        }
        writeln!(
            f,
            "- **Sources Analyzed:** {} across {} research angles ({} fetched successfully)\n",
            total_sources,
            self.results.len(),
            fetched
        )
    }

    fn key_findings(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Key Findings\n")?;
        for result in self.results {
            writeln!(f, "### {}: {}\n", result.query_type.heading(), result.query)?;

            if let Some(error) = result.error() {
                writeln!(
                    f,
                    "_No data was found for this research angle. The search did not complete: {}_\n",
                    error
                )?;
                continue;
            }

            match self.prose.sections.get(&result.query_type.to_string()) {
                Some(analysis) if !analysis.is_empty() => writeln!(f, "{}\n", analysis)?,
                _ => writeln!(f, "_No analysis was generated for this angle._\n")?,
            }

            writeln!(f, "#### Notable Sources\n")?;
            for summary in result.summaries.iter().take(self.options.sources_per_result) {
                let snippet = summary.snippet.trim();
                if snippet.is_empty() {
                    writeln!(f, "{}. [{}]({})", summary.rank, summary.title, summary.url)?;
                } else {
                    writeln!(f, "{}. [{}]({}): {}", summary.rank, summary.title, summary.url, snippet)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedGenerator {
        reply: Result<String, GenerationError>,
        last_prompt: Mutex<Option<String>>,
    }

    impl CannedGenerator {
        fn new(reply: Result<String, GenerationError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            *self.last_prompt.lock().unwrap() = Some(request.prompt);
            self.reply.clone()
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    fn summary(rank: u32, url: &str) -> BoundedSummary {
        BoundedSummary {
            rank,
            title: format!("Title {}", rank),
            url: url.to_string(),
            snippet: format!("Snippet {}", rank),
            content_preview: "p".repeat(500),
            content_length: 4_000,
            fetch_succeeded: true,
        }
    }

    fn query_set() -> QuerySet {
        QuerySet {
            original: "quantum error correction".into(),
            primary: "quantum error correction overview".into(),
            orthogonal: vec!["surface code experiments".into(), "qec decoders".into()],
            rationale: None,
        }
    }

    fn results() -> Vec<ResearchResult> {
        vec![
            ResearchResult::success(
                QueryType::Primary,
                "quantum error correction overview",
                vec![summary(1, "https://a.example"), summary(2, "https://shared.example")],
            ),
            ResearchResult::success(
                QueryType::Orthogonal(1),
                "surface code experiments",
                vec![summary(1, "https://shared.example"), summary(2, "https://b.example")],
            ),
            ResearchResult::failure(QueryType::Orthogonal(2), "qec decoders", "Rate limited by search provider"),
        ]
    }

    const PROSE: &str = r#"{
        "title": "Quantum Error Correction",
        "executive_summary": "QEC protects logical qubits.",
        "sections": {"primary": "Overview analysis.", "orthogonal_1": "Experiments analysis."},
        "conclusions": "Codes are maturing."
    }"#;

    #[test]
    fn test_consolidated_sources_dedupes_in_first_seen_order() {
        let results = results();
        let urls: Vec<&str> = consolidated_sources(&results).iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example", "https://shared.example", "https://b.example"]);
    }

    #[tokio::test]
    async fn test_report_has_sections_in_result_order() {
        let synthesizer = ReportSynthesizer::new(CannedGenerator::new(Ok(PROSE.to_string())));
        let report = synthesizer
            .synthesize("quantum error correction", &query_set(), &results())
            .await
            .unwrap();

        assert!(report.starts_with("# Research Report: Quantum Error Correction"));
        assert!(report.contains("## Summary\n\nQEC protects logical qubits."));

        let primary = report.find("### Primary Research: quantum error correction overview").unwrap();
        let ortho_1 = report.find("### Complementary Research: surface code experiments").unwrap();
        let ortho_2 = report.find("### Additional Perspective 1: qec decoders").unwrap();
        assert!(primary < ortho_1 && ortho_1 < ortho_2);

        assert!(report.contains("Overview analysis."));
        assert!(report.contains("Codes are maturing."));
    }

    #[tokio::test]
    async fn test_failed_result_states_no_data() {
        let synthesizer = ReportSynthesizer::new(CannedGenerator::new(Ok(PROSE.to_string())));
        let report = synthesizer
            .synthesize("quantum error correction", &query_set(), &results())
            .await
            .unwrap();

        let failed_section = &report[report.find("### Additional Perspective 1").unwrap()..];
        assert!(failed_section.contains("No data was found for this research angle"));
        assert!(failed_section.contains("Rate limited"));
    }

    #[tokio::test]
    async fn test_source_list_contains_shared_url_once() {
        let synthesizer = ReportSynthesizer::new(CannedGenerator::new(Ok(PROSE.to_string())));
        let report = synthesizer
            .synthesize("quantum error correction", &query_set(), &results())
            .await
            .unwrap();

        let references = &report[report.find("## Sources & References").unwrap()..];
        assert_eq!(references.matches("https://shared.example").count(), 1);
        assert!(references.contains("3. [Title 2](https://b.example)"));
    }

    #[tokio::test]
    async fn test_prompt_only_sees_trimmed_previews() {
        let generator = CannedGenerator::new(Ok(PROSE.to_string()));
        let synthesizer = ReportSynthesizer::new(generator.clone()).with_options(ReportOptions {
            sources_per_result: 1,
            preview_chars: 40,
        });
        synthesizer
            .synthesize("quantum error correction", &query_set(), &results())
            .await
            .unwrap();

        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains(&"p".repeat(40)));
        assert!(!prompt.contains(&"p".repeat(41)));
        assert!(!prompt.contains("https://b.example"), "only the top source per result");
    }

    #[tokio::test]
    async fn test_non_json_prose_still_yields_full_report() {
        let synthesizer = ReportSynthesizer::new(CannedGenerator::new(Ok("Plain prose answer.".to_string())));
        let report = synthesizer
            .synthesize("quantum error correction", &query_set(), &results())
            .await
            .unwrap();

        assert!(report.starts_with("# Research Report: quantum error correction"));
        assert!(report.contains("Plain prose answer."));
        assert!(report.contains("### Primary Research"));
        assert!(report.contains("## Sources & References"));
    }

    #[tokio::test]
    async fn test_unreachable_generator_is_an_error() {
        let synthesizer = ReportSynthesizer::new(CannedGenerator::new(Err(GenerationError::Unreachable(
            "connection refused".into(),
        ))));
        let err = synthesizer
            .synthesize("q", &query_set(), &results())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_empty_reply_still_yields_full_report() {
        let synthesizer = ReportSynthesizer::new(CannedGenerator::new(Err(GenerationError::EmptyResponse)));
        let report = synthesizer
            .synthesize("quantum error correction", &query_set(), &results())
            .await
            .unwrap();

        assert!(report.starts_with("# Research Report: quantum error correction"));
        assert!(report.contains("_No summary was generated._"));
        assert!(report.contains("_No analysis was generated for this angle._"));
        assert!(report.contains("_No conclusions were generated._"));
        assert!(report.contains("### Additional Perspective 1: qec decoders"));
        assert!(report.contains("3. [Title 2](https://b.example)"));
    }
}
