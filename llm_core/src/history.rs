//! Append-only chat history persisted as a JSON array.
//!
//! Appends from concurrent turns are serialized: the in-memory log stays
//! locked across the push, the serialization and the file write, so two
//! racing appends can never overwrite each other's record on disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

#[derive(Debug)]
pub struct ChatHistory {
    path: PathBuf,
    records: Mutex<Vec<HistoryRecord>>,
}

impl ChatHistory {
    /// Load the log at `path`.
    ///
    /// A missing file starts an empty log. An unreadable or corrupt file is
    /// logged and also starts empty; it is overwritten on the next append.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str::<Vec<HistoryRecord>>(&text) {
                Ok(records) => {
                    info!("Loaded chat history with {} entries", records.len());
                    records
                }
                Err(e) => {
                    warn!("Chat history at {} is not valid JSON: {e}", path.display());
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Error reading chat history file {}: {e}", path.display());
                Vec::new()
            }
        };

        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and persist the whole log.
    ///
    /// The record stays in memory even if the write fails.
    pub async fn append(&self, record: HistoryRecord) -> Result<(), LlmError> {
        let mut records = self.records.lock().await;
        records.push(record);

        let json = serde_json::to_string_pretty(&*records)
            .map_err(|e| LlmError::PersistenceFailed(format!("serialize: {e}")))?;
        self.persist(json).await
    }

    /// Best-effort append: failures are logged, never returned.
    pub async fn record(&self, record: HistoryRecord) {
        if let Err(e) = self.append(record).await {
            warn!("Error saving chat history: {e}");
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<HistoryRecord> {
        self.records.lock().await.clone()
    }

    async fn persist(&self, json: String) -> Result<(), LlmError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                LlmError::PersistenceFailed(format!("create {}: {e}", parent.display()))
            })?;
        }

        // Write-then-rename so a crash mid-write leaves the previous log intact.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| LlmError::PersistenceFailed(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| LlmError::PersistenceFailed(format!("rename to {}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = ChatHistory::load(dir.path().join("chat_history.json")).await;
        assert!(history.is_empty().await);
    }

    #[tokio::test]
    async fn test_append_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory").join("chat_history.json");

        let history = ChatHistory::load(&path).await;
        history.append(HistoryRecord::user("hello")).await.unwrap();
        history.append(HistoryRecord::assistant("hi there")).await.unwrap();

        let reloaded = ChatHistory::load(&path).await;
        let records = reloaded.snapshot().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[0].text, "hello");
        assert_eq!(records[1].role, Role::Assistant);
        assert_eq!(records[1].text, "hi there");
    }

    #[tokio::test]
    async fn test_record_serializes_with_lowercase_role_and_iso_timestamp() {
        let record = HistoryRecord::user("x");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["role"], "user");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty_and_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_history.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let history = ChatHistory::load(&path).await;
        assert!(history.is_empty().await);
        history.append(HistoryRecord::user("fresh")).await.unwrap();

        let reloaded = ChatHistory::load(&path).await;
        assert_eq!(reloaded.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_history.json");
        let history = Arc::new(ChatHistory::load(&path).await);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let history = history.clone();
            tasks.push(tokio::spawn(async move {
                history.append(HistoryRecord::user(format!("msg {i}"))).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let reloaded = ChatHistory::load(&path).await;
        assert_eq!(reloaded.len().await, 16);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_record_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("taken");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("inner"), "x").unwrap();

        let history = ChatHistory::load(&path).await;
        let result = history.append(HistoryRecord::user("kept")).await;
        assert!(matches!(result, Err(LlmError::PersistenceFailed(_))));
        assert_eq!(history.len().await, 1);

        // The best-effort variant swallows the same error.
        history.record(HistoryRecord::assistant("also kept")).await;
        assert_eq!(history.len().await, 2);
    }
}
