//! Result recorder seam. The engine calls the configured recorder after
//! assembling every result; persisting or forwarding is the recorder's
//! business, and its failures never surface to the submitting caller.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::loader::get_data_dir;
use crate::engine::ExecutionResult;
use crate::error::{Result, RunletError};

/// Downstream sink for finished execution results.
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn record(&self, result: &ExecutionResult) -> Result<()>;
}

/// One line of the history file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unix epoch seconds at which the result was recorded
    pub recorded_at: u64,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

/// Append-only JSONL history under the platform data directory.
pub struct HistoryRecorder {
    history_path: PathBuf,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self {
            history_path: get_data_dir().join("history.jsonl"),
        }
    }

    pub fn with_path(history_path: PathBuf) -> Self {
        Self { history_path }
    }

    /// The most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.history_path).await?;
        let mut entries = Vec::new();
        for line in content.lines() {
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping malformed history line");
                }
            }
        }

        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultRecorder for HistoryRecorder {
    async fn record(&self, result: &ExecutionResult) -> Result<()> {
        if let Some(parent) = self.history_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entry = HistoryEntry {
            recorded_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            result: result.clone(),
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .await
            .map_err(|e| {
                RunletError::Recorder(format!(
                    "cannot open {}: {}",
                    self.history_path.display(),
                    e
                ))
            })?;
        file.write_all(&line).await?;

        debug!(id = %result.id, path = %self.history_path.display(), "Recorded result");
        Ok(())
    }
}
