//! Input artifact intake
//!
//! Classifies uploaded or remotely fetched files as either a line-delimited
//! stream of extraction targets or a structured targets manifest, and
//! resolves them to a local path. The classification decides which one of
//! the two mutually exclusive scrape request fields is populated next.

use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::errors::AppError;
use crate::models::{SourceArtifact, SourceKind};

/// Classify a filename. Explicit caller intent always wins; a name carrying
/// a "target" marker (covers the plural too) means a manifest; everything
/// else defaults to a line-delimited stream.
pub fn classify(filename: &str, explicit: Option<SourceKind>) -> SourceKind {
    if let Some(kind) = explicit {
        return kind;
    }
    if filename.to_ascii_lowercase().contains("target") {
        return SourceKind::Targets;
    }
    SourceKind::Stream
}

#[derive(Clone)]
pub struct FileIntake {
    upload_dir: PathBuf,
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl FileIntake {
    pub fn new(upload_dir: PathBuf, http: reqwest::Client, fetch_timeout: Duration) -> Self {
        Self {
            upload_dir,
            http,
            fetch_timeout,
        }
    }

    /// Persist an uploaded file under a timestamped name and classify it.
    pub async fn save_upload(
        &self,
        filename: &str,
        bytes: &[u8],
        explicit: Option<SourceKind>,
    ) -> Result<SourceArtifact, AppError> {
        if bytes.is_empty() {
            return Err(AppError::invalid_config("file", "uploaded file is empty"));
        }

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let safe_name = sanitize_filename(filename);
        let path = self
            .upload_dir
            .join(format!("{}_{}", Utc::now().timestamp_millis(), safe_name));
        tokio::fs::write(&path, bytes).await?;

        let kind = classify(filename, explicit);
        info!("Saved upload '{}' as {:?} input", filename, kind);
        Ok(SourceArtifact { path, kind })
    }

    /// Fetch a remote stream or manifest reference and persist it locally.
    pub async fn fetch_remote(
        &self,
        url: &str,
        explicit: Option<SourceKind>,
    ) -> Result<SourceArtifact, AppError> {
        let response = self
            .http
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::transport(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response.bytes().await?;

        let filename = remote_filename(url);
        self.save_upload(&filename, &bytes, explicit).await
    }
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload.jsonl".to_string()
    } else {
        cleaned
    }
}

fn remote_filename(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(|s| s.to_string()))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "fetched.jsonl".to_string())
}
