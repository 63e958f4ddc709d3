//! # Configuration Module
//!
//! Loads the orchestrator's settings from environment variables (and an
//! optional `.env` file), then projects the research knobs into
//! [`ResearchOptions`] for the coordinator.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::research::bounder::{DEFAULT_PREVIEW_CHARS, DEFAULT_SNIPPET_CHARS};
use crate::research::coordinator::{DEFAULT_FAN_OUT_WIDTH, DEFAULT_RESULTS_PER_QUERY};
use crate::research::task::RESULT_COUNT_RANGE;
use crate::research::{ReportOptions, ResearchOptions, SummaryBounds, TaskOptions};

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Settings for one orchestrator run.
///
/// # Rust Concept: Option for "not configured"
///
/// `serper_api_key` and `session_timeout_secs` have no sensible default, so
/// they are `Option`s. `None` picks the keyless search engine and disables
/// the session deadline respectively.
#[derive(Debug, Clone)]
pub struct Config {
    /// The Ollama model to use (e.g., "llama3.2", "qwen2.5")
    pub model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Temperature for both generation calls
    pub temperature: f32,

    /// Serper.dev API key; without one, DuckDuckGo is used
    pub serper_api_key: Option<String>,

    /// Number of orthogonal queries next to the primary one
    pub fan_out_width: usize,

    /// Search candidates requested per query
    pub results_per_query: usize,

    /// Character budget of each source preview
    pub preview_chars: usize,

    /// Character budget of each search snippet
    pub snippet_chars: usize,

    /// Per-fetch timeout in seconds
    pub fetch_timeout_secs: u64,

    /// Concurrent fetches within one research task
    pub fetch_concurrency: usize,

    /// Deadline for a whole session in seconds
    pub session_timeout_secs: Option<u64>,

    /// Directory that holds one subdirectory per session
    pub sessions_dir: PathBuf,

    /// Top sources per result handed to the report prompt
    pub report_sources_per_result: usize,

    /// Preview budget per source inside the report prompt
    pub report_preview_chars: usize,

    /// Log filter for the application
    pub log_level: String,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for Config {
    fn default() -> Self {
        let report = ReportOptions::default();
        Self {
            model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            // Lower than a chat assistant: both calls must produce strict JSON
            temperature: 0.3,
            serper_api_key: None,
            fan_out_width: DEFAULT_FAN_OUT_WIDTH,
            results_per_query: DEFAULT_RESULTS_PER_QUERY,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
            fetch_timeout_secs: 30,
            fetch_concurrency: 4,
            session_timeout_secs: None,
            sessions_dir: PathBuf::from("research_sessions"),
            report_sources_per_result: report.sources_per_result,
            report_preview_chars: report.preview_chars,
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Rust Concept: Generic Parsing
    ///
    /// Most settings are numbers. [`parse_var`] is generic over any
    /// `T: FromStr`, so the same helper reads `usize`, `u64` and `f32` and
    /// attaches the variable name to the error through `.context()`.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OLLAMA_MODEL") {
            config.model = val;
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Some(val) = parse_var("TEMPERATURE")? {
            config.temperature = val;
        }

        // SERPERDEV_API_KEY is accepted for compatibility with older setups
        config.serper_api_key = env::var("SERPER_API_KEY")
            .or_else(|_| env::var("SERPERDEV_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty());

        if let Some(val) = parse_var("FAN_OUT_WIDTH")? {
            config.fan_out_width = val;
        }
        if let Some(val) = parse_var("RESULTS_PER_QUERY")? {
            config.results_per_query = val;
        }
        if let Some(val) = parse_var("PREVIEW_CHARS")? {
            config.preview_chars = val;
        }
        if let Some(val) = parse_var("SNIPPET_CHARS")? {
            config.snippet_chars = val;
        }
        if let Some(val) = parse_var("FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout_secs = val;
        }
        if let Some(val) = parse_var("FETCH_CONCURRENCY")? {
            config.fetch_concurrency = val;
        }
        config.session_timeout_secs = parse_var("SESSION_TIMEOUT_SECS")?;
        if let Some(val) = parse_var("REPORT_SOURCES_PER_RESULT")? {
            config.report_sources_per_result = val;
        }
        if let Some(val) = parse_var("REPORT_PREVIEW_CHARS")? {
            config.report_preview_chars = val;
        }

        if let Ok(val) = env::var("RESEARCH_SESSIONS_DIR") {
            config.sessions_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Validate the configuration before any session starts.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.model.is_empty() {
            anyhow::bail!("OLLAMA_MODEL cannot be empty");
        }

        if !RESULT_COUNT_RANGE.contains(&self.results_per_query) {
            anyhow::bail!(
                "RESULTS_PER_QUERY must be between {} and {}, got: {}",
                RESULT_COUNT_RANGE.start(),
                RESULT_COUNT_RANGE.end(),
                self.results_per_query
            );
        }

        if self.fetch_concurrency == 0 {
            anyhow::bail!("FETCH_CONCURRENCY must be at least 1");
        }

        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("FETCH_TIMEOUT_SECS must be at least 1");
        }

        if self.session_timeout_secs == Some(0) {
            anyhow::bail!("SESSION_TIMEOUT_SECS must be at least 1 when set");
        }

        if self.report_sources_per_result == 0 {
            anyhow::bail!("REPORT_SOURCES_PER_RESULT must be at least 1");
        }

        Ok(())
    }

    /// Project the research knobs into the coordinator's options.
    pub fn research_options(&self) -> ResearchOptions {
        ResearchOptions {
            fan_out_width: self.fan_out_width,
            results_per_query: self.results_per_query,
            task: TaskOptions {
                bounds: SummaryBounds {
                    preview_chars: self.preview_chars,
                    snippet_chars: self.snippet_chars,
                },
                fetch_timeout: self.fetch_timeout(),
                fetch_concurrency: self.fetch_concurrency,
            },
            report: ReportOptions {
                sources_per_result: self.report_sources_per_result,
                preview_chars: self.report_preview_chars,
            },
            session_timeout: self.session_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Read and parse `name`, treating an unset or blank variable as `None`.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {:?}", name, val)),
        _ => Ok(None),
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.ollama_host, "http://localhost:11434");
        assert_eq!(config.fan_out_width, 2);
        assert_eq!(config.results_per_query, 10);
        assert_eq!(config.sessions_dir, PathBuf::from("research_sessions"));
        assert!(config.serper_api_key.is_none());
        assert!(config.session_timeout_secs.is_none());
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_temperature() {
        let mut config = Config::default();
        config.temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_results_range() {
        let mut config = Config::default();
        config.results_per_query = 0;
        assert!(config.validate().is_err());

        config.results_per_query = 51;
        assert!(config.validate().is_err());

        config.results_per_query = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_width_is_allowed() {
        let mut config = Config::default();
        config.fan_out_width = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_research_options_projection() {
        let config = Config {
            fan_out_width: 3,
            results_per_query: 7,
            preview_chars: 200,
            fetch_timeout_secs: 5,
            session_timeout_secs: Some(90),
            report_sources_per_result: 2,
            ..Config::default()
        };

        let options = config.research_options();
        assert_eq!(options.fan_out_width, 3);
        assert_eq!(options.results_per_query, 7);
        assert_eq!(options.task.bounds.preview_chars, 200);
        assert_eq!(options.task.bounds.snippet_chars, 300);
        assert_eq!(options.task.fetch_timeout, Duration::from_secs(5));
        assert_eq!(options.report.sources_per_result, 2);
        assert_eq!(options.session_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_var_reports_name() {
        env::set_var("RESEARCH_ORCHESTRATOR_TEST_BAD_NUMBER", "twelve");
        let err = parse_var::<usize>("RESEARCH_ORCHESTRATOR_TEST_BAD_NUMBER").unwrap_err();
        assert!(err.to_string().contains("RESEARCH_ORCHESTRATOR_TEST_BAD_NUMBER"));

        assert!(parse_var::<usize>("RESEARCH_ORCHESTRATOR_TEST_UNSET")
            .unwrap()
            .is_none());
    }
}
