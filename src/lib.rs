//! # Research Orchestrator
//!
//! Fan-out deep research over the web with a local LLM:
//!
//! ```text
//! query ──► refine ──► primary ─────┐
//!                 ├──► orthogonal_1 ├──► synthesize ──► markdown report
//!                 └──► orthogonal_N ┘
//! ```
//!
//! Every research task searches, fetches and bounds its sources on its own;
//! the coordinator only waits for all of them before writing the report.
//! Search, fetch, generation and storage are traits so the whole pipeline
//! runs against stubs in tests.

pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod research;
pub mod storage;
pub mod tools;
pub mod types;

pub use config::Config;
pub use context::SessionContext;
pub use error::{FetchError, GenerationError, RefineError, ResearchError, SearchError, StorageError};
pub use llm::{GenerationRequest, OllamaGenerator, TextGenerator};
pub use research::{Coordinator, ProgressEvent, ProgressReporter, ResearchOptions};
pub use storage::{FilesystemStore, MemoryStore, SessionStore};
pub use tools::{DuckDuckGoSearch, Fetcher, HttpFetcher, SearchProvider, SerperSearch};
pub use types::{
    BoundedSummary, FullArticle, QuerySet, QueryType, ResearchRequest, ResearchResult, ResearchSession,
    SourceCandidate, TaskOutcome,
};
