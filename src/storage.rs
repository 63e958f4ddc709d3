//! Durable session storage.
//!
//! Every record of one session lives under the session identifier:
//! `queries`, `research_results_<query_type>` and `final_report`.
//! Writes for different query types target distinct keys, so concurrent
//! research tasks never contend for the same record.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageError;
use crate::types::QueryType;

/// Key of the refined query set record.
pub const QUERIES_KEY: &str = "queries";

/// Key of the final report record.
pub const REPORT_KEY: &str = "final_report";

/// Key of the full-detail record written by one research task.
pub fn results_key(query_type: QueryType) -> String {
    format!("research_results_{}", query_type)
}

/// Storage capability used by the research components.
///
/// JSON records hold structured data; text records hold rendered markdown.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn write_json(&self, session_id: &str, key: &str, payload: &Value) -> Result<(), StorageError>;

    async fn read_json(&self, session_id: &str, key: &str) -> Result<Value, StorageError>;

    async fn write_text(&self, session_id: &str, key: &str, text: &str) -> Result<(), StorageError>;

    async fn read_text(&self, session_id: &str, key: &str) -> Result<String, StorageError>;

    /// Where a session's records live, when the store has a location to show.
    fn location(&self, _session_id: &str) -> Option<PathBuf> {
        None
    }
}

/// Keys and session ids become path components, so they must stay inside one directory.
fn validate_component(component: &str) -> Result<(), StorageError> {
    let bad = component.is_empty()
        || component.contains("..")
        || component.contains('/')
        || component.contains('\\')
        || component.starts_with('~');
    if bad {
        return Err(StorageError::InvalidKey(component.to_string()));
    }
    Ok(())
}

// =============================================================================
// FILESYSTEM STORE
// =============================================================================

/// Stores each session in `<root>/<session_id>/`.
///
/// JSON records are written as pretty-printed `<key>.json`, text records as `<key>.md`.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, session_id: &str, key: &str, extension: &str) -> Result<PathBuf, StorageError> {
        validate_component(session_id)?;
        validate_component(key)?;
        Ok(self.root.join(session_id).join(format!("{}.{}", key, extension)))
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved session record");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<String, StorageError> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SessionStore for FilesystemStore {
    async fn write_json(&self, session_id: &str, key: &str, payload: &Value) -> Result<(), StorageError> {
        let path = self.record_path(session_id, key, "json")?;
        let bytes = serde_json::to_vec_pretty(payload)?;
        self.write_file(&path, &bytes).await
    }

    async fn read_json(&self, session_id: &str, key: &str) -> Result<Value, StorageError> {
        let path = self.record_path(session_id, key, "json")?;
        let contents = self.read_file(&path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn write_text(&self, session_id: &str, key: &str, text: &str) -> Result<(), StorageError> {
        let path = self.record_path(session_id, key, "md")?;
        self.write_file(&path, text.as_bytes()).await
    }

    async fn read_text(&self, session_id: &str, key: &str) -> Result<String, StorageError> {
        let path = self.record_path(session_id, key, "md")?;
        self.read_file(&path).await
    }

    fn location(&self, session_id: &str) -> Option<PathBuf> {
        Some(self.root.join(session_id))
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

#[derive(Debug, Clone)]
enum Record {
    Json(Value),
    Text(String),
}

/// Keeps records in memory. Useful for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, String), Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys written for one session, sorted.
    pub async fn keys(&self, session_id: &str) -> Vec<String> {
        let records = self.records.read().await;
        let mut keys: Vec<String> = records
            .keys()
            .filter(|(sid, _)| sid == session_id)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn write_json(&self, session_id: &str, key: &str, payload: &Value) -> Result<(), StorageError> {
        validate_component(session_id)?;
        validate_component(key)?;
        self.records
            .write()
            .await
            .insert((session_id.to_string(), key.to_string()), Record::Json(payload.clone()));
        Ok(())
    }

    async fn read_json(&self, session_id: &str, key: &str) -> Result<Value, StorageError> {
        match self.records.read().await.get(&(session_id.to_string(), key.to_string())) {
            Some(Record::Json(value)) => Ok(value.clone()),
            _ => Err(StorageError::NotFound(format!("{}/{}", session_id, key))),
        }
    }

    async fn write_text(&self, session_id: &str, key: &str, text: &str) -> Result<(), StorageError> {
        validate_component(session_id)?;
        validate_component(key)?;
        self.records
            .write()
            .await
            .insert((session_id.to_string(), key.to_string()), Record::Text(text.to_string()));
        Ok(())
    }

    async fn read_text(&self, session_id: &str, key: &str) -> Result<String, StorageError> {
        match self.records.read().await.get(&(session_id.to_string(), key.to_string())) {
            Some(Record::Text(text)) => Ok(text.clone()),
            _ => Err(StorageError::NotFound(format!("{}/{}", session_id, key))),
        }
    }
}
