//! Session-scoped context handed to every research component.
//!
//! Carries the session identifier, the storage handle and the progress
//! reporter. There is no process-wide session state.

use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StorageError;
use crate::research::progress::{ProgressEvent, ProgressReporter};
use crate::storage::SessionStore;

#[derive(Clone)]
pub struct SessionContext {
    id: String,
    store: Arc<dyn SessionStore>,
    progress: ProgressReporter,
}

impl SessionContext {
    pub fn new(id: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            id: id.into(),
            store,
            progress: ProgressReporter::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Timestamp-derived session identifier, e.g. `2024-05-01_14-03-59`.
    pub fn generate_id() -> String {
        Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn location(&self) -> Option<PathBuf> {
        self.store.location(&self.id)
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event);
    }

    /// Serialize `record` and write it under this session.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, record: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(record)?;
        self.store.write_json(&self.id, key, &value).await
    }

    pub async fn save_text(&self, key: &str, text: &str) -> Result<(), StorageError> {
        self.store.write_text(&self.id, key, text).await
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("progress", &self.progress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_generated_id_shape() {
        let id = SessionContext::generate_id();
        assert_eq!(id.len(), "2024-05-01_14-03-59".len());
        assert_eq!(&id[10..11], "_");
    }

    #[tokio::test]
    async fn test_save_writes_under_session_id() {
        let store = Arc::new(MemoryStore::new());
        let ctx = SessionContext::new("s1", store.clone());

        ctx.save("queries", &serde_json::json!({"primary": "q"})).await.unwrap();
        ctx.save_text("final_report", "# r").await.unwrap();

        assert_eq!(store.keys("s1").await, vec!["final_report", "queries"]);
        assert!(ctx.location().is_none());
    }
}
