//! Prompt templates for the two text-generation steps:
//! - Refiner: one user query → primary + orthogonal search queries
//! - Synthesizer: bounded summaries → report prose

use chrono::Utc;
use serde_json::{json, Value};

use crate::types::QueryType;

/// Prompt templates for the research session
pub struct ResearchPrompts;

impl ResearchPrompts {
    fn current_date() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    pub fn refiner_system() -> &'static str {
        "You are a search query optimization expert. Output valid JSON only."
    }

    /// Refinement prompt asking for one primary and `width` orthogonal queries.
    ///
    /// `strict` is used for the single retry after an unparseable reply.
    pub fn refiner(original: &str, width: usize, strict: bool) -> String {
        let mut prompt = format!(
            r#"For context, today's date is {date}.

Given the user's research query, generate {total} web search queries:

1. PRIMARY: Optimize the user query for a web search engine. Make it clear, specific, and likely to return highly relevant results.
2. ORTHOGONAL: {width} related but different angles. Each explores a complementary aspect, perspective or related topic. They must not repeat the primary query or each other.

User Query: "{original}"

Return ONLY a JSON object with this exact structure:
{{
    "primary": "optimized primary search query",
    "orthogonal": [{slots}],
    "rationale": {{
        "primary": "brief explanation of the primary query strategy"{rationale_slots}
    }}
}}
"#,
            date = Self::current_date(),
            total = width + 1,
            width = width,
            original = original,
            slots = (1..=width)
                .map(|i| format!("\"orthogonal search query {}\"", i))
                .collect::<Vec<_>>()
                .join(", "),
            rationale_slots = (1..=width)
                .map(|i| format!(
                    ",\n        \"{}\": \"brief explanation of this angle\"",
                    QueryType::Orthogonal(i)
                ))
                .collect::<String>(),
        );

        if strict {
            prompt.push_str(&format!(
                "\nYour previous answer could not be parsed. Reply with the JSON object and nothing else: \
                 no markdown fences, no commentary. The \"orthogonal\" array must contain exactly {} non-empty strings.\n",
                width
            ));
        }

        prompt
    }

    pub fn refiner_schema(width: usize) -> Value {
        json!({
            "type": "object",
            "required": ["primary", "orthogonal"],
            "properties": {
                "primary": {"type": "string", "minLength": 1},
                "orthogonal": {
                    "type": "array",
                    "items": {"type": "string", "minLength": 1},
                    "minItems": width,
                    "maxItems": width
                },
                "rationale": {
                    "type": "object",
                    "additionalProperties": {"type": "string"}
                }
            }
        })
    }

    pub fn synthesizer_system() -> &'static str {
        "You are an expert research analyst. You write clear, well-sourced research summaries. Output valid JSON only."
    }

    /// Synthesis prompt over the bounded research digest.
    pub fn synthesizer(original: &str, digest: &Value, section_tags: &[QueryType]) -> String {
        let digest = serde_json::to_string_pretty(digest).unwrap_or_else(|_| digest.to_string());
        let tags = section_tags
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"For context, today's date is {date}.

Write the prose for a research report based on the following data.

ORIGINAL QUERY: {original}

RESEARCH DATA:
{digest}

Return ONLY a JSON object with these fields:
- "title": a short report title based on the query
- "executive_summary": 2-3 paragraphs giving an overview of the findings
- "sections": an object with one entry per research angle, keyed by {tags}. Each value synthesizes the findings of that angle and refers to sources by title. For an angle whose status is "failed", say that it produced no data.
- "conclusions": integrate the insights from all angles

Only use the information in the research data. Do not invent sources.
"#,
            date = Self::current_date(),
            original = original,
            digest = digest,
            tags = tags,
        )
    }

    pub fn synthesizer_schema() -> Value {
        json!({
            "type": "object",
            "required": ["executive_summary", "sections", "conclusions"],
            "properties": {
                "title": {"type": "string"},
                "executive_summary": {"type": "string"},
                "sections": {
                    "type": "object",
                    "additionalProperties": {"type": "string"}
                },
                "conclusions": {"type": "string"}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refiner_prompt_mentions_width() {
        let prompt = ResearchPrompts::refiner("quantum error correction", 2, false);
        assert!(prompt.contains("quantum error correction"));
        assert!(prompt.contains("generate 3 web search queries"));
        assert!(prompt.contains("\"orthogonal_2\""));
        assert!(!prompt.contains("could not be parsed"));
    }

    #[test]
    fn test_strict_refiner_prompt() {
        let prompt = ResearchPrompts::refiner("q", 4, true);
        assert!(prompt.contains("could not be parsed"));
        assert!(prompt.contains("exactly 4 non-empty strings"));
    }

    #[test]
    fn test_refiner_schema_fixes_array_length() {
        let schema = ResearchPrompts::refiner_schema(2);
        assert_eq!(schema["properties"]["orthogonal"]["minItems"], 2);
        assert_eq!(schema["properties"]["orthogonal"]["maxItems"], 2);
    }

    #[test]
    fn test_synthesizer_prompt_lists_sections() {
        let tags = QueryType::launch_order(2);
        let prompt = ResearchPrompts::synthesizer("q", &json!({"results": []}), &tags);
        assert!(prompt.contains("\"primary\", \"orthogonal_1\", \"orthogonal_2\""));
        assert!(prompt.contains("RESEARCH DATA"));
    }
}
