//! The research pipeline.
//!
//! - [`QueryRefiner`]: one query → primary + orthogonal queries
//! - [`ResearchTask`]: search, fetch and bound sources for one query
//! - [`ReportSynthesizer`]: all results → markdown report
//! - [`Coordinator`]: runs the above as one fan-out session

pub mod bounder;
pub mod coordinator;
pub mod progress;
pub mod prompts;
pub mod refiner;
pub mod synthesizer;
pub mod task;

pub use bounder::{bound, truncate_chars, SummaryBounds};
pub use coordinator::{Coordinator, ResearchOptions};
pub use progress::{ProgressEvent, ProgressReporter};
pub use refiner::QueryRefiner;
pub use synthesizer::{consolidated_sources, ReportOptions, ReportSynthesizer};
pub use task::{ResearchTask, TaskOptions};
