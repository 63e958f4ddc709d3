//! Query refiner: one user query → one primary and `width` orthogonal queries.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::prompts::ResearchPrompts;
use crate::error::RefineError;
use crate::llm::{extract_json, GenerationRequest, TextGenerator};
use crate::types::{QuerySet, QueryType};

/// Phrases refined queries through the text-generation capability.
///
/// The only side effect is the generation call itself.
#[derive(Clone)]
pub struct QueryRefiner {
    generator: Arc<dyn TextGenerator>,
}

impl QueryRefiner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Refine `original` into a [`QuerySet`] with `width` orthogonal queries.
    ///
    /// An unparseable reply is retried once with a stricter prompt; a second
    /// bad reply fails with [`RefineError::MalformedResponse`]. Transport
    /// errors from the generator are not retried.
    pub async fn refine(&self, original: &str, width: usize) -> Result<QuerySet, RefineError> {
        let original = original.trim();
        if original.is_empty() {
            return Err(RefineError::InvalidInput(
                "research query must not be empty".to_string(),
            ));
        }

        info!(original = %original, width, "Refining query");

        let query_set = match self.attempt(original, width, false).await {
            Err(RefineError::MalformedResponse(reason)) => {
                warn!(reason = %reason, "Refinement reply unparseable, retrying with stricter prompt");
                self.attempt(original, width, true).await?
            }
            other => other?,
        };

        for (a, b) in query_set.duplicate_queries() {
            warn!(first = %a, second = %b, "Refiner produced coinciding queries");
        }
        for (tag, query) in query_set.tagged() {
            info!(query_type = %tag, query = %query, "Refined query");
        }

        Ok(query_set)
    }

    async fn attempt(&self, original: &str, width: usize, strict: bool) -> Result<QuerySet, RefineError> {
        let request = GenerationRequest::new(
            ResearchPrompts::refiner_system(),
            ResearchPrompts::refiner(original, width, strict),
        )
        .with_schema(ResearchPrompts::refiner_schema(width));

        let reply = self.generator.generate(request).await?;
        debug!(chars = reply.len(), strict, "Refinement reply received");
        parse_query_set(original, width, &reply)
    }
}

/// Parse a refinement reply.
///
/// Accepts `{"primary", "orthogonal": [...], "rationale"}` as well as the flat
/// `{"primary", "orthogonal_1", "orthogonal_2", ..., "reasoning"}` shape.
/// Surplus orthogonal queries are dropped; missing or empty ones are an error.
fn parse_query_set(original: &str, width: usize, reply: &str) -> Result<QuerySet, RefineError> {
    let malformed = |msg: String| RefineError::MalformedResponse(msg);

    let value: Value = serde_json::from_str(extract_json(reply))
        .map_err(|e| malformed(format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object".to_string()))?;

    let primary = non_empty_str(object, "primary")
        .ok_or_else(|| malformed("missing or empty \"primary\"".to_string()))?;

    let mut orthogonal = match object.get("orthogonal") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::trim).filter(|s| !s.is_empty()).map(String::from))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("\"orthogonal\" must contain non-empty strings".to_string()))?,
        Some(_) => return Err(malformed("\"orthogonal\" must be an array".to_string())),
        None => (1..=width)
            .map_while(|i| non_empty_str(object, &QueryType::Orthogonal(i).to_string()))
            .collect(),
    };

    if orthogonal.len() < width {
        return Err(malformed(format!(
            "expected {} orthogonal queries, got {}",
            width,
            orthogonal.len()
        )));
    }
    if orthogonal.len() > width {
        debug!(got = orthogonal.len(), width, "Dropping surplus orthogonal queries");
        orthogonal.truncate(width);
    }

    let rationale = object
        .get("rationale")
        .or_else(|| object.get("reasoning"))
        .and_then(parse_rationale);

    Ok(QuerySet {
        original: original.to_string(),
        primary,
        orthogonal,
        rationale,
    })
}

fn non_empty_str(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse_rationale(value: &Value) -> Option<BTreeMap<String, String>> {
    let map: BTreeMap<String, String> = match value {
        Value::Object(entries) => entries
            .iter()
            .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.trim().to_string())))
            .filter(|(_, v)| !v.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => {
            BTreeMap::from([(QueryType::Primary.to_string(), s.trim().to_string())])
        }
        _ => BTreeMap::new(),
    };
    (!map.is_empty()).then_some(map)
}
