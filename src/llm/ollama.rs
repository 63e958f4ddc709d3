//! # Ollama Generator
//!
//! Text generation through a local Ollama server using the Rig framework.
//! It demonstrates:
//! - Rig's agent builder pattern
//! - Mapping a third-party error type into our own error enum
//! - Implementing an async trait for a concrete backend

use async_trait::async_trait;
use rig::client::{CompletionClient, Nothing};
use rig::completion::Prompt;
use rig::providers::ollama;
use std::fmt;
use tracing::{debug, info};

use super::{GenerationRequest, TextGenerator};
use crate::error::GenerationError;

/// Generates text with an Ollama-hosted model.
///
/// # Rust Concept: Owned Configuration
///
/// The generator owns its client, model name and host, so it can be shared
/// behind an `Arc` without borrowing from the config it was built from.
/// Two generators pointed at different hosts never interfere.
#[derive(Clone)]
pub struct OllamaGenerator {
    client: ollama::Client,
    model: String,
    host: String,
    temperature: f64,
}

impl OllamaGenerator {
    /// Create a generator for `model` served at `host`.
    ///
    /// The rig client is built once, here, with `host` as its base URL.
    pub fn new(
        model: impl Into<String>,
        host: impl Into<String>,
        temperature: f32,
    ) -> Result<Self, GenerationError> {
        let host = host.into();
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(&host)
            .build()
            .map_err(|e| GenerationError::Client(format!("{}: {}", host, e)))?;

        Ok(Self {
            client,
            model: model.into(),
            host,
            temperature: temperature as f64,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Debug for OllamaGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaGenerator")
            .field("model", &self.model)
            .field("host", &self.host)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            host = %self.host,
            model = %self.model,
            structured = request.schema.is_some(),
            "Sending generation request"
        );

        let preamble = request.system_with_schema();
        let agent = self
            .client
            .agent(&self.model)
            .preamble(&preamble)
            .temperature(self.temperature)
            .build();

        let response = agent
            .prompt(request.prompt.as_str())
            .await
            .map_err(|e| GenerationError::Unreachable(e.to_string()))?;

        if response.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        info!(model = %self.model, chars = response.len(), "Generation completed");
        Ok(response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_creation() {
        let generator = OllamaGenerator::new("llama3.2", "http://localhost:11434", 0.7).unwrap();

        assert_eq!(generator.model(), "llama3.2");
        assert_eq!(generator.host(), "http://localhost:11434");
        assert!((generator.temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_generators_keep_their_own_host() {
        let local = OllamaGenerator::new("llama3.2", "http://localhost:11434", 0.3).unwrap();
        let remote = OllamaGenerator::new("qwen2.5", "http://10.0.0.5:11434", 0.3).unwrap();

        assert_eq!(local.host(), "http://localhost:11434");
        assert_eq!(remote.host(), "http://10.0.0.5:11434");
        assert_eq!(local.client.base_url(), "http://localhost:11434");
        assert_eq!(remote.client.base_url(), "http://10.0.0.5:11434");
        assert!(std::env::var("OLLAMA_API_BASE_URL").map_or(true, |v| v != remote.host()));
    }
}
