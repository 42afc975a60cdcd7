//! Article scraping pipeline
//!
//! Consumes the selector stream produced by discovery (or a targets
//! manifest), processes sites under the site pool and their targets under
//! the nested target, sitemap/css, http and per-domain pools, and appends
//! every scraped item to the articles JSONL through a single writer task.

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::events::Event;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::jobs::{pools::host_of, ProgressHandle, ScrapePools};
use crate::models::{JobRequest, ScrapeMode, ScrapeRequest};
use crate::overview::OverviewStore;

use super::{read_jsonl, PipelineExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Sitemap,
    Css,
}

#[derive(Debug, Clone)]
struct ScrapeTarget {
    site: String,
    kind: TargetKind,
    url: String,
}

pub struct ScrapePipeline {
    http: reqwest::Client,
    overview: OverviewStore,
    default_stream_path: PathBuf,
    articles_path: PathBuf,
    pool_acquire_timeout: Duration,
}

impl ScrapePipeline {
    pub fn new(
        http: reqwest::Client,
        overview: OverviewStore,
        default_stream_path: PathBuf,
        articles_path: PathBuf,
        pool_acquire_timeout: Duration,
    ) -> Self {
        Self {
            http,
            overview,
            default_stream_path,
            articles_path,
            pool_acquire_timeout,
        }
    }

    /// Load scrape targets grouped by site from either input shape.
    async fn load_targets(
        &self,
        request: &ScrapeRequest,
    ) -> Result<(String, Vec<(String, Vec<ScrapeTarget>)>), PipelineError> {
        if let Some(targets_path) = &request.targets_path {
            let path = PathBuf::from(targets_path);
            if !path.exists() {
                return Err(PipelineError::missing_input(targets_path.clone()));
            }
            let raw = tokio::fs::read(&path).await?;
            let manifest: Vec<Value> = serde_json::from_slice(&raw)?;
            let mut grouped: Vec<(String, Vec<ScrapeTarget>)> = Vec::new();
            for entry in &manifest {
                let Some(target) = target_from_value(entry, entry["site"].as_str()) else {
                    continue;
                };
                match grouped.iter_mut().find(|(site, _)| *site == target.site) {
                    Some((_, targets)) => targets.push(target),
                    None => grouped.push((target.site.clone(), vec![target])),
                }
            }
            return Ok((targets_path.clone(), grouped));
        }

        let path = request
            .stream_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_stream_path.clone());
        let rows = read_jsonl(&path).await?;

        let mut seen = HashSet::new();
        let mut grouped = Vec::new();
        for row in &rows {
            let (site, targets) = normalize_targets(row);
            if site.is_empty() || !seen.insert(site.clone()) {
                continue;
            }
            grouped.push((site, targets));
        }
        Ok((path.display().to_string(), grouped))
    }

    /// Scrape one target. A failed or timed-out fetch fails only this
    /// sub-operation and yields zero items.
    async fn scrape_target(
        &self,
        target: &ScrapeTarget,
        request: &ScrapeRequest,
        pools: &ScrapePools,
    ) -> Vec<Value> {
        // Type pool, then per-domain cap, then the shared http pool.
        let _type_slot = match target.kind {
            TargetKind::Sitemap => pools.sitemap.acquire().await,
            TargetKind::Css => pools.css.acquire().await,
        };
        let _type_slot = match _type_slot {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Pool acquisition failed for {}: {}", target.url, e);
                return Vec::new();
            }
        };
        let _domain_slot = match pools.per_domain.acquire(&host_of(&target.url)).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Domain cap acquisition failed for {}: {}", target.url, e);
                return Vec::new();
            }
        };
        let _http_slot = match pools.http.acquire_timeout(self.pool_acquire_timeout).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("HTTP slot unavailable for {}: {}", target.url, e);
                return Vec::new();
            }
        };

        let timeout = Duration::from_secs(request.timeout_secs);
        let body = match self.fetch_text(&target.url, timeout).await {
            Ok(body) => body,
            Err(e) => {
                debug!("Fetch failed for {}: {}", target.url, e);
                return Vec::new();
            }
        };

        match target.kind {
            TargetKind::Sitemap => parse_sitemap_locs(&body, request.max_items)
                .into_iter()
                .map(|loc| json!({"url": loc}))
                .collect(),
            TargetKind::Css => vec![json!({"url": target.url, "bytes": body.len()})],
        }
    }

    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, PipelineError> {
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
                    PipelineError::execution("scrape", e.to_string())
                }
            })?;
        if !response.status().is_success() {
            return Err(PipelineError::execution(
                "scrape",
                format!("{} returned {}", url, response.status()),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| PipelineError::execution("scrape", e.to_string()))
    }
}

/// Convert one selector stream row into zero or more scrape targets.
fn normalize_targets(row: &Value) -> (String, Vec<ScrapeTarget>) {
    let result = &row["result"];
    let site = result["url"].as_str().unwrap_or("").trim().to_string();
    if site.is_empty() {
        return (site, Vec::new());
    }

    let targets = result["targets"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| target_from_value(entry, Some(&site)))
                .collect()
        })
        .unwrap_or_default();
    (site, targets)
}

fn target_from_value(entry: &Value, site: Option<&str>) -> Option<ScrapeTarget> {
    let url = entry["url"].as_str()?.trim().to_string();
    if url.is_empty() {
        return None;
    }
    let kind = match entry["type"].as_str()? {
        "sitemap" => TargetKind::Sitemap,
        "css" => TargetKind::Css,
        _ => return None,
    };
    let site = site.unwrap_or(&url).trim().to_string();
    Some(ScrapeTarget { site, kind, url })
}

fn mode_allows(mode: ScrapeMode, kind: TargetKind) -> bool {
    match mode {
        ScrapeMode::Auto | ScrapeMode::Both => true,
        ScrapeMode::Sitemap => kind == TargetKind::Sitemap,
        ScrapeMode::Css => kind == TargetKind::Css,
    }
}

/// Extract `<loc>` entries from a sitemap document, capped at `max_items`.
fn parse_sitemap_locs(xml: &str, max_items: usize) -> Vec<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut in_loc = false;
    let mut locs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"loc" => in_loc = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(text)) if in_loc => {
                if let Ok(loc) = text.unescape() {
                    let loc = loc.trim().to_string();
                    if !loc.is_empty() {
                        locs.push(loc);
                        if locs.len() >= max_items {
                            break;
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Sitemap parse stopped: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    locs
}

#[async_trait]
impl PipelineExecutor for ScrapePipeline {
    async fn execute(
        &self,
        request: &JobRequest,
        progress: ProgressHandle,
    ) -> Result<Value, PipelineError> {
        let JobRequest::Scrape(request) = request else {
            return Err(PipelineError::execution(
                "scrape",
                "request type does not match executor",
            ));
        };

        let (input_path, sites) = self.load_targets(request).await?;
        let pools = ScrapePools::from_request(request)
            .map_err(|e| PipelineError::execution("pool setup", e.to_string()))?;

        // Single writer task; sites feed it through a bounded channel.
        let (items_tx, mut items_rx) = mpsc::channel::<Value>(100);
        let articles_path = self.articles_path.clone();
        let writer = tokio::spawn(async move {
            if let Some(parent) = articles_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&articles_path)
                .await?;
            let mut written = 0u64;
            while let Some(item) = items_rx.recv().await {
                file.write_all(format!("{}\n", item).as_bytes()).await?;
                written += 1;
            }
            file.flush().await?;
            Ok::<u64, std::io::Error>(written)
        });

        let total_sites = sites.len();
        let done = Arc::new(AtomicUsize::new(0));
        let mut site_handles = Vec::with_capacity(total_sites);

        for (site, targets) in sites {
            let pipeline = ScrapePipeline {
                http: self.http.clone(),
                overview: self.overview.clone(),
                default_stream_path: self.default_stream_path.clone(),
                articles_path: self.articles_path.clone(),
                pool_acquire_timeout: self.pool_acquire_timeout,
            };
            let request = request.clone();
            let pools = pools.clone();
            let items_tx = items_tx.clone();
            let progress = progress.clone();
            let done = done.clone();

            site_handles.push(tokio::spawn(async move {
                // Site slot held for the whole site; target slots nest inside.
                let _site_slot = match pools.site.acquire().await {
                    Ok(slot) => slot,
                    Err(e) => {
                        warn!("Site slot acquisition failed for {}: {}", site, e);
                        return (site, 0u64);
                    }
                };

                let mut target_handles = Vec::new();
                for target in targets {
                    if !mode_allows(request.mode, target.kind) {
                        continue;
                    }
                    let pipeline = ScrapePipeline {
                        http: pipeline.http.clone(),
                        overview: pipeline.overview.clone(),
                        default_stream_path: pipeline.default_stream_path.clone(),
                        articles_path: pipeline.articles_path.clone(),
                        pool_acquire_timeout: pipeline.pool_acquire_timeout,
                    };
                    let request = request.clone();
                    let pools = pools.clone();
                    let items_tx = items_tx.clone();
                    let site = site.clone();

                    target_handles.push(tokio::spawn(async move {
                        let _target_slot = match pools.target.acquire().await {
                            Ok(slot) => slot,
                            Err(e) => {
                                warn!("Target slot acquisition failed for {}: {}", target.url, e);
                                return 0u64;
                            }
                        };

                        let source_type = match target.kind {
                            TargetKind::Sitemap => "sitemap",
                            TargetKind::Css => "css",
                        };
                        let items = pipeline.scrape_target(&target, &request, &pools).await;
                        let mut sent = 0u64;
                        for item in items {
                            let row = json!({
                                "site": site,
                                "sourceType": source_type,
                                "item": item,
                                "ts": Utc::now().to_rfc3339(),
                            });
                            if items_tx.send(row).await.is_err() {
                                break;
                            }
                            sent += 1;
                        }
                        sent
                    }));
                }

                let mut site_items = 0u64;
                for handle in target_handles {
                    site_items += handle.await.unwrap_or(0);
                }

                let domain = host_of(&site);
                if let Err(e) = pipeline
                    .overview
                    .upsert(&domain, |row| {
                        row.raw_articles += site_items;
                        row.overall_status = "scraped".to_string();
                    })
                    .await
                {
                    warn!("Failed to update overview for {}: {}", domain, e);
                }

                let completed = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress
                    .report(((completed * 100) / total_sites.max(1)) as u8)
                    .await;

                (site, site_items)
            }));
        }
        drop(items_tx);

        let mut sites_processed = 0usize;
        let mut total_articles = 0u64;
        for joined in futures::future::join_all(site_handles).await {
            match joined {
                Ok((_site, items)) => {
                    sites_processed += 1;
                    total_articles += items;
                }
                Err(e) => {
                    return Err(PipelineError::execution("scrape", e.to_string()));
                }
            }
        }

        let written = writer
            .await
            .map_err(|e| PipelineError::execution("scrape", e.to_string()))??;

        Ok(json!({
            "status": "completed",
            "input_path": input_path,
            "output_path": self.articles_path.display().to_string(),
            "sites_processed": sites_processed,
            "total_articles": total_articles,
            "items_written": written,
            "mode": serde_json::to_value(request.mode)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sitemap_locs_are_extracted_and_capped() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/a</loc></url>
              <url><loc> https://example.com/b </loc></url>
              <url><loc>https://example.com/c</loc></url>
            </urlset>"#;

        let all = parse_sitemap_locs(xml, 10);
        assert_eq!(
            all,
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/c"
            ]
        );

        let capped = parse_sitemap_locs(xml, 2);
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn stream_rows_normalize_into_targets() {
        let row = json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "result": {
                "url": "https://news.example.com",
                "targets": [
                    {"type": "sitemap", "url": "https://news.example.com/sitemap.xml"},
                    {"type": "css", "url": "https://news.example.com"},
                    {"type": "rss", "url": "https://news.example.com/feed"}
                ]
            }
        });

        let (site, targets) = normalize_targets(&row);
        assert_eq!(site, "https://news.example.com");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].kind, TargetKind::Sitemap);
        assert_eq!(targets[1].kind, TargetKind::Css);
    }

    #[test]
    fn mode_filters_target_kinds() {
        assert!(mode_allows(ScrapeMode::Auto, TargetKind::Sitemap));
        assert!(mode_allows(ScrapeMode::Both, TargetKind::Css));
        assert!(mode_allows(ScrapeMode::Sitemap, TargetKind::Sitemap));
        assert!(!mode_allows(ScrapeMode::Sitemap, TargetKind::Css));
        assert!(!mode_allows(ScrapeMode::Css, TargetKind::Sitemap));
    }
}
