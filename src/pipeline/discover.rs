//! Selector discovery pipeline
//!
//! For each submitted URL this probes the site and its sitemap under the
//! request's concurrency limits, appends one row per site to the selector
//! stream file and upserts the per-domain overview row. Site-level failures
//! are captured into their rows; the job itself only fails when the pool
//! setup or the stream file cannot be handled.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::jobs::{pools::host_of, ConcurrencyPool, ProgressHandle};
use crate::models::{DiscoveryRequest, JobRequest};
use crate::overview::OverviewStore;

use super::{append_jsonl, PipelineExecutor};

pub struct DiscoveryPipeline {
    http: reqwest::Client,
    overview: OverviewStore,
    stream_path: PathBuf,
}

impl DiscoveryPipeline {
    pub fn new(http: reqwest::Client, overview: OverviewStore, stream_path: PathBuf) -> Self {
        Self {
            http,
            overview,
            stream_path,
        }
    }

    async fn probe_site(
        &self,
        url: &str,
        request: &DiscoveryRequest,
        detector_pool: &ConcurrencyPool,
    ) -> Result<Value, PipelineError> {
        let timeout = Duration::from_secs(request.timeout_secs);

        // Page probe decides whether a css fallback target exists at all.
        let page_ok = {
            let _slot = detector_pool.acquire().await?;
            self.fetch_ok(url, timeout).await?
        };

        // Sitemap probe at the site root.
        let sitemap_url = sitemap_url_for(url);
        let sitemap_ok = {
            let _slot = detector_pool.acquire().await?;
            match &sitemap_url {
                Some(sitemap) => self.fetch_ok(sitemap, timeout).await.unwrap_or(false),
                None => false,
            }
        };

        let mut targets = Vec::new();
        if sitemap_ok {
            if let Some(sitemap) = &sitemap_url {
                targets.push(json!({"type": "sitemap", "url": sitemap}));
            }
        }
        if page_ok {
            targets.push(json!({"type": "css", "url": url}));
        }

        Ok(json!({
            "url": url,
            "recentHours": request.recent_hours,
            "maxDepth": request.max_depth,
            "sitemapDetected": sitemap_ok,
            "pageReachable": page_ok,
            "targets": targets,
        }))
    }

    async fn fetch_ok(&self, url: &str, timeout: Duration) -> Result<bool, PipelineError> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::fetch_timeout(url)
                } else {
                    PipelineError::execution("discover", e.to_string())
                }
            })?;
        Ok(response.status().is_success())
    }
}

fn sitemap_url_for(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}/sitemap.xml", parsed.scheme(), host))
}

#[async_trait]
impl PipelineExecutor for DiscoveryPipeline {
    async fn execute(
        &self,
        request: &JobRequest,
        progress: ProgressHandle,
    ) -> Result<Value, PipelineError> {
        let JobRequest::Discover(request) = request else {
            return Err(PipelineError::execution(
                "discover",
                "request type does not match executor",
            ));
        };

        let site_pool = ConcurrencyPool::new("site", request.site_concurrency)
            .map_err(|e| PipelineError::execution("discover", e.to_string()))?;
        let detector_pool = ConcurrencyPool::new("detector", request.detector_concurrency)
            .map_err(|e| PipelineError::execution("discover", e.to_string()))?;

        let urls: Vec<String> = request
            .urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        let total = urls.len();
        let done = Arc::new(AtomicUsize::new(0));
        let stream_lock = Arc::new(Mutex::new(()));

        let mut handles = Vec::with_capacity(total);
        for url in urls {
            let pipeline = DiscoveryPipeline {
                http: self.http.clone(),
                overview: self.overview.clone(),
                stream_path: self.stream_path.clone(),
            };
            let request = request.clone();
            let site_pool = site_pool.clone();
            let detector_pool = detector_pool.clone();
            let progress = progress.clone();
            let done = done.clone();
            let stream_lock = stream_lock.clone();

            handles.push(tokio::spawn(async move {
                // Site slot first, detector slots nested within it.
                let _site_slot = match site_pool.acquire().await {
                    Ok(slot) => slot,
                    Err(e) => return (url, Err(e)),
                };

                let outcome = pipeline.probe_site(&url, &request, &detector_pool).await;
                let domain = host_of(&url);

                let row = match &outcome {
                    Ok(stats) => json!({
                        "timestamp": Utc::now().to_rfc3339(),
                        "result": stats,
                    }),
                    Err(err) => json!({
                        "timestamp": Utc::now().to_rfc3339(),
                        "result": {"url": url.clone(), "targets": [], "error": err.to_string()},
                    }),
                };

                {
                    let _guard = stream_lock.lock().await;
                    if let Err(e) = append_jsonl(&pipeline.stream_path, &row).await {
                        warn!("Failed to append stream row for {}: {}", url, e);
                    }
                }

                let sitemap_ok = outcome
                    .as_ref()
                    .map(|s| s["sitemapDetected"].as_bool().unwrap_or(false))
                    .unwrap_or(false);
                let css_ok = outcome
                    .as_ref()
                    .map(|s| s["pageReachable"].as_bool().unwrap_or(false))
                    .unwrap_or(false);
                let failed = outcome.is_err();
                if let Err(e) = pipeline
                    .overview
                    .upsert(&domain, |site| {
                        site.discovery_attempted = true;
                        site.sitemap_status =
                            if sitemap_ok { "success" } else { "empty" }.to_string();
                        site.css_fallback_status =
                            if css_ok { "success" } else { "not_attempted" }.to_string();
                        site.overall_status =
                            if failed { "error" } else { "discovered" }.to_string();
                    })
                    .await
                {
                    warn!("Failed to update overview for {}: {}", domain, e);
                }

                let completed = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress
                    .report(((completed * 100) / total.max(1)) as u8)
                    .await;

                (url, outcome)
            }));
        }

        let mut results = Vec::with_capacity(total);
        let mut completed = 0usize;
        let mut failed = 0usize;
        for joined in futures::future::join_all(handles).await {
            let (url, outcome) =
                joined.map_err(|e| PipelineError::execution("discover", e.to_string()))?;
            match outcome {
                Ok(stats) => {
                    completed += 1;
                    results.push(json!({"url": url, "status": "completed", "stats": stats}));
                }
                Err(err) => {
                    failed += 1;
                    debug!("Discovery failed for {}: {}", url, err);
                    results.push(json!({"url": url, "status": "failed", "error": err.to_string()}));
                }
            }
        }

        Ok(json!({
            "total_urls": total,
            "completed": completed,
            "failed": failed,
            "results": results,
            "stream_file": self.stream_path.display().to_string(),
        }))
    }
}
