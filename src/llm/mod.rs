//! Text-generation capability.
//!
//! Used twice per session: once to phrase the refined queries and once to
//! write the report prose. Both calls ask for JSON shaped by a schema and
//! parse the reply themselves.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GenerationError;

mod ollama;

pub use ollama::OllamaGenerator;

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Role and ground rules for the model
    pub system: String,
    pub prompt: String,
    /// JSON schema the reply should follow, if structured output is wanted
    pub schema: Option<Value>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// System prompt with the schema appended, for backends without native
    /// structured output.
    pub fn system_with_schema(&self) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{}\n\nRespond with a single JSON object that matches this JSON schema. \
                 Output valid JSON only, no markdown, no explanation.\n{}",
                self.system,
                serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
            ),
            None => self.system.clone(),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Model identifier for logs.
    fn model(&self) -> &str;
}

/// Pull the JSON payload out of a model reply.
///
/// Models like to wrap JSON in markdown fences or add a sentence around it;
/// this returns the fenced block if there is one, otherwise the outermost
/// `{ ... }` span, otherwise the trimmed text.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_fenced() {
        let reply = "```json\n{\"primary\": \"q\"}\n```";
        assert_eq!(extract_json(reply), "{\"primary\": \"q\"}");

        let reply = "Here you go:\n```\n{\"b\": 2}\n```\nThanks";
        assert_eq!(extract_json(reply), "{\"b\": 2}");
    }

    #[test]
    fn test_extract_json_surrounded_by_prose() {
        assert_eq!(extract_json("Sure! {\"c\": 3} Hope that helps."), "{\"c\": 3}");
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn test_system_with_schema() {
        let request = GenerationRequest::new("You are terse.", "hi");
        assert_eq!(request.system_with_schema(), "You are terse.");

        let request = request.with_schema(json!({"type": "object"}));
        let system = request.system_with_schema();
        assert!(system.starts_with("You are terse."));
        assert!(system.contains("\"type\": \"object\""));
    }
}
