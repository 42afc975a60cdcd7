//! Pipeline executors
//!
//! An executor is the opaque long-running function behind a job: it takes
//! the typed request, reports progress through the handle it is given, and
//! returns a result payload or an error. The scheduler owns the state
//! machine around it; executors never touch job status directly.
//!
//! Timed-out sub-operations fail only that sub-operation. The shipped
//! executors do not retry them; retry policy is external to the job core.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::errors::PipelineError;
use crate::jobs::ProgressHandle;
use crate::models::JobRequest;

pub mod clean;
pub mod discover;
pub mod scrape;

pub use clean::CleanPipeline;
pub use discover::DiscoveryPipeline;
pub use scrape::ScrapePipeline;

#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &JobRequest,
        progress: ProgressHandle,
    ) -> Result<Value, PipelineError>;
}

/// Append one JSON value as a line to a JSONL artifact, creating parent
/// directories on first write.
pub(crate) async fn append_jsonl(path: &Path, value: &Value) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{}\n", value).as_bytes()).await?;
    Ok(())
}

/// Read a JSONL artifact once, skipping blank and malformed lines.
pub(crate) async fn read_jsonl(path: &Path) -> Result<Vec<Value>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::missing_input(path.display().to_string()));
    }

    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut rows = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            rows.push(value);
        }
    }
    Ok(rows)
}
