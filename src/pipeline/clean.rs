//! Article cleaning pipeline
//!
//! Reads the raw scraped articles, drops duplicates and rows without a
//! usable link, rewrites the cleaned artifact from scratch and updates the
//! per-domain cleaned counts.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::errors::PipelineError;
use crate::jobs::{pools::host_of, ProgressHandle};
use crate::models::JobRequest;
use crate::overview::OverviewStore;

use super::{read_jsonl, PipelineExecutor};

pub struct CleanPipeline {
    overview: OverviewStore,
    default_input_path: PathBuf,
    cleaned_path: PathBuf,
}

impl CleanPipeline {
    pub fn new(
        overview: OverviewStore,
        default_input_path: PathBuf,
        cleaned_path: PathBuf,
    ) -> Self {
        Self {
            overview,
            default_input_path,
            cleaned_path,
        }
    }
}

fn article_url(row: &Value) -> Option<String> {
    let url = row["item"]["url"].as_str()?.trim();
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

#[async_trait]
impl PipelineExecutor for CleanPipeline {
    async fn execute(
        &self,
        request: &JobRequest,
        progress: ProgressHandle,
    ) -> Result<Value, PipelineError> {
        let JobRequest::Clean(request) = request else {
            return Err(PipelineError::execution(
                "clean",
                "request type does not match executor",
            ));
        };

        let input_path = request
            .input_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_input_path.clone());

        let rows = read_jsonl(&input_path).await?;
        progress.report(10).await;

        let mut seen_urls = HashSet::new();
        let mut kept = Vec::new();
        let mut duplicates = 0usize;
        let mut invalid = 0usize;
        let mut cleaned_by_domain: HashMap<String, u64> = HashMap::new();

        for row in &rows {
            let site = row["site"].as_str().unwrap_or("").trim().to_string();
            let Some(url) = article_url(row) else {
                invalid += 1;
                continue;
            };
            if site.is_empty() {
                invalid += 1;
                continue;
            }
            if !seen_urls.insert(url) {
                duplicates += 1;
                continue;
            }
            *cleaned_by_domain.entry(host_of(&site)).or_insert(0) += 1;
            kept.push(row.clone());
        }
        progress.report(60).await;

        if let Some(parent) = self.cleaned_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&self.cleaned_path).await?;
        for row in &kept {
            file.write_all(format!("{}\n", row).as_bytes()).await?;
        }
        file.flush().await?;
        progress.report(90).await;

        for (domain, count) in &cleaned_by_domain {
            if let Err(e) = self
                .overview
                .upsert(domain, |site| {
                    site.cleaned_articles = *count;
                    site.overall_status = "cleaned".to_string();
                })
                .await
            {
                warn!("Failed to update overview for {}: {}", domain, e);
            }
        }

        Ok(json!({
            "status": "completed",
            "summary": {
                "input_path": input_path.display().to_string(),
                "output_path": self.cleaned_path.display().to_string(),
                "input_rows": rows.len(),
                "kept": kept.len(),
                "duplicates_dropped": duplicates,
                "invalid_dropped": invalid,
            }
        }))
    }
}
