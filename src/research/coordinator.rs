//! Fan-out coordinator: the sole entry point of a research session.
//!
//! ```text
//! refine ──► spawn 1 + width research tasks ──► await all (launch order)
//!        ──► synthesize report ──► ResearchSession
//! ```
//!
//! Tasks run as separate tokio tasks so a panic in one is caught at the join
//! and turned into a failed result without touching its siblings.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinError};
use tracing::{error, info, warn};

use super::progress::{ProgressEvent, ProgressReporter};
use super::refiner::QueryRefiner;
use super::synthesizer::{ReportOptions, ReportSynthesizer};
use super::task::{ResearchTask, TaskOptions, RESULT_COUNT_RANGE};
use crate::context::SessionContext;
use crate::error::{ResearchError, StorageError};
use crate::llm::TextGenerator;
use crate::storage::{SessionStore, QUERIES_KEY, REPORT_KEY};
use crate::tools::{Fetcher, SearchProvider};
use crate::types::{QuerySet, QueryType, ResearchRequest, ResearchResult, ResearchSession};

/// Default number of orthogonal queries.
pub const DEFAULT_FAN_OUT_WIDTH: usize = 2;

/// Default candidates requested per query.
pub const DEFAULT_RESULTS_PER_QUERY: usize = 10;

/// Knobs for a whole session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResearchOptions {
    pub fan_out_width: usize,
    pub results_per_query: usize,
    pub task: TaskOptions,
    pub report: ReportOptions,
    /// Deadline for the whole session; `None` waits as long as it takes
    pub session_timeout: Option<Duration>,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            fan_out_width: DEFAULT_FAN_OUT_WIDTH,
            results_per_query: DEFAULT_RESULTS_PER_QUERY,
            task: TaskOptions::default(),
            report: ReportOptions::default(),
            session_timeout: None,
        }
    }
}

/// Aborts the spawned research tasks if the session future is dropped early
/// (session timeout). Aborting a finished task is a no-op.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Coordinates one fixed-shape fan-out per request.
pub struct Coordinator {
    refiner: QueryRefiner,
    task: ResearchTask,
    synthesizer: ReportSynthesizer,
    store: Arc<dyn SessionStore>,
    progress: ProgressReporter,
    options: ResearchOptions,
}

impl Coordinator {
    /// Build a coordinator from its capabilities, with default options.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let options = ResearchOptions::default();
        Self {
            refiner: QueryRefiner::new(generator.clone()),
            task: ResearchTask::new(search, fetcher).with_options(options.task),
            synthesizer: ReportSynthesizer::new(generator).with_options(options.report),
            store,
            progress: ProgressReporter::disabled(),
            options,
        }
    }

    pub fn with_options(mut self, options: ResearchOptions) -> Self {
        self.task = self.task.with_options(options.task);
        self.synthesizer = self.synthesizer.with_options(options.report);
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &ResearchOptions {
        &self.options
    }

    /// Run a session with the configured width and result count.
    pub async fn research(&self, original_query: &str) -> Result<ResearchSession, ResearchError> {
        self.execute(
            ResearchRequest::new(original_query),
            self.options.fan_out_width,
            self.options.results_per_query,
        )
        .await
    }

    /// Run one research session.
    ///
    /// Returns a complete session with a report, or the error of the phase
    /// that failed. Individual research task failures never surface here;
    /// they show up as failed results inside the session.
    pub async fn execute(
        &self,
        request: ResearchRequest,
        width: usize,
        result_count: usize,
    ) -> Result<ResearchSession, ResearchError> {
        let original = request.original_query.trim();
        if original.is_empty() {
            return Err(ResearchError::InvalidInput(
                "research query must not be empty".to_string(),
            ));
        }
        if !RESULT_COUNT_RANGE.contains(&result_count) {
            return Err(ResearchError::InvalidInput(format!(
                "results per query must be between {} and {}, got {}",
                RESULT_COUNT_RANGE.start(),
                RESULT_COUNT_RANGE.end(),
                result_count
            )));
        }

        let ctx = SessionContext::new(SessionContext::generate_id(), self.store.clone())
            .with_progress(self.progress.clone());

        info!(session_id = %ctx.id(), query = %original, width, result_count, "Starting research session");
        ctx.emit(ProgressEvent::SessionCreated {
            session_id: ctx.id().to_string(),
            location: ctx.location(),
        });

        let session = self.run_session(&ctx, original, width, result_count);
        match self.options.session_timeout {
            Some(deadline) => tokio::time::timeout(deadline, session).await.map_err(|_| {
                error!(session_id = %ctx.id(), ?deadline, "Research session timed out");
                ResearchError::SessionTimeout(deadline)
            })?,
            None => session.await,
        }
    }

    async fn run_session(
        &self,
        ctx: &SessionContext,
        original: &str,
        width: usize,
        result_count: usize,
    ) -> Result<ResearchSession, ResearchError> {
        let query_set = self.refiner.refine(original, width).await?;
        ctx.emit(ProgressEvent::QueriesRefined {
            query_set: query_set.clone(),
        });
        if let Err(e) = ctx.save(QUERIES_KEY, &query_set).await {
            warn!(error = %e, "Failed to persist refined queries");
        }

        let results = self.fan_out(ctx, &query_set, result_count).await;

        ctx.emit(ProgressEvent::SynthesisStarted);
        let report = self
            .synthesizer
            .synthesize(original, &query_set, &results)
            .await
            .map_err(ResearchError::Synthesis)?;

        match ctx.save_text(REPORT_KEY, &report).await {
            Ok(()) => info!(session_id = %ctx.id(), location = ?ctx.location(), "Final report saved"),
            Err(e) => warn!(error = %e, "Failed to persist final report"),
        }
        ctx.emit(ProgressEvent::ReportWritten {
            location: ctx.location(),
        });

        Ok(ResearchSession {
            id: ctx.id().to_string(),
            query_set,
            results,
            report: Some(report),
        })
    }

    /// Launch one task per query and wait for every one to finish.
    ///
    /// Results come back in launch order regardless of completion order.
    async fn fan_out(&self, ctx: &SessionContext, query_set: &QuerySet, result_count: usize) -> Vec<ResearchResult> {
        let launches: Vec<(QueryType, String)> = query_set
            .tagged()
            .into_iter()
            .map(|(tag, query)| (tag, query.to_string()))
            .collect();

        info!(tasks = launches.len(), "Launching research tasks in parallel");

        let handles: Vec<_> = launches
            .iter()
            .map(|(tag, query)| {
                let task = self.task.clone();
                let ctx = ctx.clone();
                let (tag, query) = (*tag, query.clone());
                tokio::spawn(async move { task.run(&ctx, &query, tag, result_count).await })
            })
            .collect();
        let _guard = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());

        join_all(handles)
            .await
            .into_iter()
            .zip(launches)
            .map(|(joined, (tag, query))| settle(ctx, tag, query, joined))
            .collect()
    }

    /// Read back the stored report of an earlier session.
    pub async fn load_report(&self, session_id: &str) -> Result<String, ResearchError> {
        Ok(self.store.read_text(session_id, REPORT_KEY).await?)
    }

    /// Read back the stored query set of an earlier session.
    pub async fn load_queries(&self, session_id: &str) -> Result<QuerySet, ResearchError> {
        let value = self.store.read_json(session_id, QUERIES_KEY).await?;
        serde_json::from_value(value).map_err(|e| StorageError::from(e).into())
    }
}

/// Turn a joined task into a result, converting errors and panics into failures.
fn settle(
    ctx: &SessionContext,
    tag: QueryType,
    query: String,
    joined: Result<Result<ResearchResult, ResearchError>, JoinError>,
) -> ResearchResult {
    let failure = |reason: String| {
        error!(query_type = %tag, error = %reason, "Research task failed unexpectedly");
        ctx.emit(ProgressEvent::TaskFinished {
            query_type: tag,
            succeeded: false,
            sources: 0,
        });
        ResearchResult::failure(tag, query.clone(), reason)
    };

    match joined {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => failure(e.to_string()),
        Err(e) if e.is_panic() => failure(format!("research task panicked: {}", e)),
        Err(e) => failure(format!("research task was cancelled: {}", e)),
    }
}
