//! # Research Orchestrator CLI
//!
//! Runs one fan-out research session against a local Ollama model and
//! prints the final markdown report.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- "quantum error correction"
//! cargo run -- --width 3 --results 5 "rust async runtimes"
//! cargo run -- --show 2024-05-01_14-03-59
//! ```

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use research_orchestrator::research::{Coordinator, ProgressEvent, ProgressReporter};
use research_orchestrator::{
    Config, DuckDuckGoSearch, FilesystemStore, HttpFetcher, OllamaGenerator, ResearchError,
    ResearchRequest, SearchProvider, SerperSearch, SessionStore, StorageError,
};
use research_orchestrator::storage::REPORT_KEY;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "research-orchestrator",
    version,
    about = "Fan-out deep research: refine a query, research several angles in parallel, synthesize a report",
    long_about = r#"
Research Orchestrator

Turns one research question into a primary search query plus N orthogonal
queries, researches all of them in parallel (search, fetch, summarize) and
writes a single markdown report from everything that was found.

PREREQUISITES:
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Start Ollama: ollama serve
  4. Optional: set SERPER_API_KEY for Google results (DuckDuckGo otherwise)

EXAMPLES:
  research-orchestrator "quantum error correction"
  research-orchestrator --width 3 --results 5 "rust async runtimes"
  research-orchestrator --show 2024-05-01_14-03-59
"#
)]
struct Args {
    /// The research topic or question to investigate
    #[arg(value_name = "QUERY", required_unless_present = "show")]
    query: Option<String>,

    /// The Ollama model to use (overrides OLLAMA_MODEL env var)
    #[arg(short = 'm', long = "model", env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Number of orthogonal queries next to the primary one
    #[arg(short = 'w', long = "width")]
    width: Option<usize>,

    /// Search results requested per query (1-50)
    #[arg(short = 'r', long = "results")]
    results: Option<usize>,

    /// Directory where sessions are stored
    #[arg(long = "sessions-dir", value_name = "DIR")]
    sessions_dir: Option<PathBuf>,

    /// Abort the whole session after this many seconds
    #[arg(long = "session-timeout", value_name = "SECS")]
    session_timeout: Option<u64>,

    /// Print the stored report of an earlier session and exit
    #[arg(long = "show", value_name = "SESSION_ID", conflicts_with = "query")]
    show: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

impl Args {
    /// Command-line flags win over environment configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(width) = self.width {
            config.fan_out_width = width;
        }
        if let Some(results) = self.results {
            config.results_per_query = results;
        }
        if let Some(dir) = &self.sessions_dir {
            config.sessions_dir = dir.clone();
        }
        if let Some(secs) = self.session_timeout {
            config.session_timeout_secs = Some(secs);
        }
    }
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    args.apply(&mut config);

    init_logging(args.verbose, &config.log_level)?;
    config.validate()?;

    info!(
        model = %config.model,
        host = %config.ollama_host,
        width = config.fan_out_width,
        results = config.results_per_query,
        sessions_dir = %config.sessions_dir.display(),
        "Configuration loaded"
    );

    let store = Arc::new(FilesystemStore::new(&config.sessions_dir));

    if let Some(session_id) = &args.show {
        return match store.read_text(session_id, REPORT_KEY).await {
            Ok(report) => {
                print_report(&report);
                Ok(())
            }
            Err(e) => Err(report_failure("Could not load the stored report", e.into())),
        };
    }

    let query = args.query.clone().unwrap_or_default();

    let search: Arc<dyn SearchProvider> = match &config.serper_api_key {
        Some(key) => Arc::new(SerperSearch::new(key.clone())),
        None => {
            info!("SERPER_API_KEY not set, using DuckDuckGo");
            Arc::new(DuckDuckGoSearch::new())
        }
    };
    let fetcher = Arc::new(HttpFetcher::new().with_timeout(config.fetch_timeout()));
    let generator = Arc::new(
        OllamaGenerator::new(
            config.model.clone(),
            config.ollama_host.clone(),
            config.temperature,
        )
        .context("Invalid OLLAMA_API_BASE_URL")?,
    );

    let (progress, events) = ProgressReporter::channel();
    let listener = tokio::spawn(log_progress(events));

    let coordinator = Coordinator::new(generator, search, fetcher, store)
        .with_options(config.research_options())
        .with_progress(progress);

    let result = coordinator
        .execute(
            ResearchRequest::new(query),
            config.fan_out_width,
            config.results_per_query,
        )
        .await;

    // Dropping the coordinator closes the progress channel so the listener ends
    drop(coordinator);
    let _ = listener.await;

    match result {
        Ok(session) => {
            info!(
                session_id = %session.id,
                sources = session.total_sources(),
                "Research completed successfully"
            );
            if let Some(report) = &session.report {
                print_report(report);
            }
            println!(
                "Session saved to {}",
                config.sessions_dir.join(&session.id).display()
            );
            Ok(())
        }
        Err(e) => Err(report_failure("Research failed", e)),
    }
}

/// Log and print a failure with its tip, then hand it back to `main`.
fn report_failure(what: &str, err: ResearchError) -> anyhow::Error {
    error!(error = %err, "{}", what);
    eprintln!("\n{}: {}", what, err);
    if let Some(tip) = failure_tip(&err) {
        eprintln!("\nTip: {}", tip);
    }
    err.into()
}

fn print_report(report: &str) {
    println!("\n{}", "=".repeat(60));
    println!("RESEARCH REPORT");
    println!("{}\n", "=".repeat(60));
    println!("{}", report);
    println!("\n{}", "=".repeat(60));
}

/// Suggest a fix for failures with a common, local cause.
fn failure_tip(err: &ResearchError) -> Option<&'static str> {
    let text = err.to_string();
    match err {
        ResearchError::Refinement(_) | ResearchError::Synthesis(_)
            if text.contains("connection refused") || text.contains("unreachable") =>
        {
            Some("Make sure Ollama is running: ollama serve")
        }
        ResearchError::Refinement(_) if text.contains("model") => {
            Some("Make sure the model is installed: ollama pull llama3.2")
        }
        ResearchError::SessionTimeout(_) => {
            Some("Raise --session-timeout or lower --results")
        }
        ResearchError::Storage(StorageError::NotFound(_)) => {
            Some("Check the session id and --sessions-dir")
        }
        ResearchError::Storage(StorageError::Io(_)) => {
            Some("Check that --sessions-dir is writable")
        }
        _ => None,
    }
}

// =============================================================================
// PROGRESS
// =============================================================================
/// Render progress events as log lines until the channel closes.
async fn log_progress(mut events: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::SessionCreated { session_id, location } => {
                info!(session_id = %session_id, location = ?location, "Session created")
            }
            ProgressEvent::QueriesRefined { query_set } => {
                for (tag, query) in query_set.tagged() {
                    info!(query_type = %tag, query = %query, "Query ready");
                }
            }
            ProgressEvent::TaskStarted { query_type, query } => {
                info!(query_type = %query_type, query = %query, "Research task started")
            }
            ProgressEvent::SourceFetched { query_type, rank, succeeded } => {
                debug!(query_type = %query_type, rank, succeeded, "Source fetched")
            }
            ProgressEvent::TaskFinished { query_type, succeeded, sources } => {
                info!(query_type = %query_type, succeeded, sources, "Research task finished")
            }
            ProgressEvent::SynthesisStarted => info!("Synthesizing report"),
            ProgressEvent::ReportWritten { location } => {
                info!(location = ?location, "Report written")
            }
        }
    }
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Initialize the tracing subscriber.
///
/// `--verbose` forces debug output; otherwise the `RUST_LOG`-style filter
/// from the configuration applies.
fn init_logging(verbose: bool, filter: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["test", "What is Rust?"]);
        assert_eq!(args.query.as_deref(), Some("What is Rust?"));
        assert!(args.show.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_with_flags() {
        let args = Args::parse_from([
            "test",
            "--verbose",
            "--model",
            "qwen2.5",
            "--width",
            "3",
            "--results",
            "5",
            "--session-timeout",
            "120",
            "Test query",
        ]);

        assert_eq!(args.query.as_deref(), Some("Test query"));
        assert!(args.verbose);
        assert_eq!(args.model, Some("qwen2.5".to_string()));
        assert_eq!(args.width, Some(3));
        assert_eq!(args.results, Some(5));
        assert_eq!(args.session_timeout, Some(120));
    }

    #[test]
    fn test_show_does_not_need_query() {
        let args = Args::parse_from(["test", "--show", "2024-05-01_14-03-59"]);
        assert!(args.query.is_none());
        assert_eq!(args.show.as_deref(), Some("2024-05-01_14-03-59"));
    }

    #[test]
    fn test_query_required_without_show() {
        assert!(Args::try_parse_from(["test"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "test",
            "--width",
            "0",
            "--sessions-dir",
            "/tmp/sessions",
            "query",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.fan_out_width, 0);
        assert_eq!(config.sessions_dir, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.results_per_query, 10);
    }

    #[test]
    fn test_storage_failures_have_tips() {
        let missing = ResearchError::from(StorageError::NotFound("2020-01-01_00-00-00/report".into()));
        assert_eq!(failure_tip(&missing), Some("Check the session id and --sessions-dir"));

        let unwritable = ResearchError::from(StorageError::Io(std::io::Error::other("read-only")));
        assert_eq!(failure_tip(&unwritable), Some("Check that --sessions-dir is writable"));
    }

    #[tokio::test]
    async fn test_missing_stored_report_maps_to_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());

        let err: ResearchError = store
            .read_text("2020-01-01_00-00-00", REPORT_KEY)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, ResearchError::Storage(StorageError::NotFound(_))));
        assert!(failure_tip(&err).is_some());
    }
}
