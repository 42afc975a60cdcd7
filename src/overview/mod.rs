//! Per-domain overview store
//!
//! Process-scoped table of per-domain pipeline rows, loaded once at startup
//! and persisted to a JSON file after each upsert. The status endpoints are
//! pure projections over this table; the job core never reads it.

use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{SiteOverview, StatusSummary};

#[derive(Clone)]
pub struct OverviewStore {
    path: PathBuf,
    rows: Arc<RwLock<HashMap<String, SiteOverview>>>,
}

impl OverviewStore {
    /// Load the store from disk, starting empty when the file is absent.
    pub async fn load(path: PathBuf) -> Result<Self, AppError> {
        let rows = if path.exists() {
            let raw = tokio::fs::read(&path).await?;
            serde_json::from_slice(&raw)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            rows: Arc::new(RwLock::new(rows)),
        })
    }

    /// Apply a patch to one domain's row, creating it on first touch, and
    /// persist the snapshot. The write lock is held across persistence so
    /// concurrent upserts cannot write snapshots to disk out of order.
    pub async fn upsert<F>(&self, domain: &str, patch: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut SiteOverview),
    {
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(domain.to_string())
            .or_insert_with(|| SiteOverview::new(domain));
        patch(row);
        row.last_updated = Utc::now();

        self.persist(&rows).await
    }

    async fn persist(&self, rows: &HashMap<String, SiteOverview>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_vec_pretty(rows)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }

    /// Site rows matching an optional domain substring filter, newest first.
    pub async fn sites(&self, domain_filter: Option<&str>, limit: usize) -> Vec<SiteOverview> {
        let rows = self.rows.read().await;
        let mut sites: Vec<SiteOverview> = rows
            .values()
            .filter(|site| match domain_filter {
                Some(filter) => site
                    .domain
                    .to_ascii_lowercase()
                    .contains(&filter.to_ascii_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        sites.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        sites.truncate(limit);
        sites
    }

    /// Aggregate projection over all matching rows.
    pub async fn summary(&self, domain_filter: Option<&str>, limit: usize) -> StatusSummary {
        let sites = self.sites(domain_filter, usize::MAX).await;

        let sites_with_sitemap = sites
            .iter()
            .filter(|s| s.sitemap_status == "success")
            .count();
        let sites_with_css_only = sites
            .iter()
            .filter(|s| s.css_fallback_status == "success" && s.sitemap_status != "success")
            .count();
        let sites_failed = sites.iter().filter(|s| s.overall_status == "error").count();
        let total_raw_articles = sites.iter().map(|s| s.raw_articles).sum();
        let total_cleaned_articles = sites.iter().map(|s| s.cleaned_articles).sum();

        let mut listed = sites.clone();
        listed.truncate(limit);

        StatusSummary {
            total_sites: sites.len(),
            sites_with_sitemap,
            sites_with_css_only,
            sites_failed,
            total_raw_articles,
            total_cleaned_articles,
            sites: listed,
            last_updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir()
            .join("news-harvester-tests")
            .join(format!("overview-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn upsert_persists_and_reloads() {
        let path = temp_store_path();
        let store = OverviewStore::load(path.clone()).await.unwrap();

        store
            .upsert("example.com", |site| {
                site.discovery_attempted = true;
                site.sitemap_status = "success".to_string();
                site.raw_articles = 12;
            })
            .await
            .unwrap();

        let reloaded = OverviewStore::load(path.clone()).await.unwrap();
        let sites = reloaded.sites(None, 10).await;
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].domain, "example.com");
        assert_eq!(sites[0].raw_articles, 12);

        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn concurrent_upserts_all_reach_disk() {
        let path = temp_store_path();
        let store = OverviewStore::load(path.clone()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(&format!("site-{}.com", i), |site| {
                        site.raw_articles = 1;
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // The persisted snapshot must be the final one, not an older
        // interleaving, so a reload sees every row.
        let reloaded = OverviewStore::load(path.clone()).await.unwrap();
        assert_eq!(reloaded.sites(None, 100).await.len(), 16);

        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn summary_counts_statuses() {
        let path = temp_store_path();
        let store = OverviewStore::load(path.clone()).await.unwrap();

        store
            .upsert("a.com", |s| {
                s.sitemap_status = "success".to_string();
                s.raw_articles = 5;
                s.cleaned_articles = 3;
            })
            .await
            .unwrap();
        store
            .upsert("b.com", |s| {
                s.css_fallback_status = "success".to_string();
            })
            .await
            .unwrap();
        store
            .upsert("c.com", |s| {
                s.overall_status = "error".to_string();
            })
            .await
            .unwrap();

        let summary = store.summary(None, 100).await;
        assert_eq!(summary.total_sites, 3);
        assert_eq!(summary.sites_with_sitemap, 1);
        assert_eq!(summary.sites_with_css_only, 1);
        assert_eq!(summary.sites_failed, 1);
        assert_eq!(summary.total_raw_articles, 5);
        assert_eq!(summary.total_cleaned_articles, 3);

        let filtered = store.summary(Some("a.com"), 100).await;
        assert_eq!(filtered.total_sites, 1);

        let _ = tokio::fs::remove_file(path).await;
    }
}
