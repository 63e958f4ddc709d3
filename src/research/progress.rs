//! Status events emitted while a session runs.
//!
//! The coordinator never blocks on a listener: events go into an unbounded
//! channel and are dropped silently when nobody is receiving.

use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::types::{QuerySet, QueryType};

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    SessionCreated { session_id: String, location: Option<PathBuf> },
    QueriesRefined { query_set: QuerySet },
    TaskStarted { query_type: QueryType, query: String },
    SourceFetched { query_type: QueryType, rank: u32, succeeded: bool },
    TaskFinished { query_type: QueryType, succeeded: bool, sources: usize },
    SynthesisStarted,
    ReportWritten { location: Option<PathBuf> },
}

/// Cloneable handle that research components report through.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter with a fresh channel, returning the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.emit(ProgressEvent::SynthesisStarted);
        reporter.emit(ProgressEvent::ReportWritten { location: None });

        assert_eq!(rx.recv().await, Some(ProgressEvent::SynthesisStarted));
        assert_eq!(rx.recv().await, Some(ProgressEvent::ReportWritten { location: None }));
    }

    #[test]
    fn test_disabled_reporter_and_dropped_receiver_are_silent() {
        ProgressReporter::disabled().emit(ProgressEvent::SynthesisStarted);

        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);
        reporter.emit(ProgressEvent::SynthesisStarted);
    }
}
