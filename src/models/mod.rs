use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

use crate::errors::AppError;

/// One tracked unit of pipeline work with a lifecycle and identifier.
///
/// Exactly one of `result`/`error` is populated once the job reaches a
/// terminal state; neither is populated before that. Ids are never reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Discover,
    Scrape,
    Clean,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed are terminal; no transition out of a terminal
    /// state is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Typed configuration for a job submission.
///
/// Validation runs before a job record is created; a request that fails
/// validation never appears in the registry. The HTTP layer deserializes
/// the concrete request types, never this enum.
#[derive(Debug, Clone)]
pub enum JobRequest {
    Discover(DiscoveryRequest),
    Scrape(ScrapeRequest),
    Clean(CleanRequest),
}

impl JobRequest {
    pub fn job_type(&self) -> JobType {
        match self {
            JobRequest::Discover(_) => JobType::Discover,
            JobRequest::Scrape(_) => JobType::Scrape,
            JobRequest::Clean(_) => JobType::Clean,
        }
    }

    /// Validate type-specific constraints. Fails with `InvalidConfig` before
    /// any job is created.
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            JobRequest::Discover(req) => {
                if req.urls.iter().all(|u| u.trim().is_empty()) {
                    return Err(AppError::invalid_config(
                        "urls",
                        "at least one discovery URL is required",
                    ));
                }
                require_at_least_one("site_concurrency", req.site_concurrency)?;
                require_at_least_one("detector_concurrency", req.detector_concurrency)?;
                require_at_least_one("timeout_secs", req.timeout_secs as usize)?;
                require_at_least_one("max_depth", req.max_depth as usize)?;
                Ok(())
            }
            JobRequest::Scrape(req) => {
                if req.stream_path.is_some() && req.targets_path.is_some() {
                    return Err(AppError::invalid_config(
                        "stream_path",
                        "stream_path and targets_path are mutually exclusive",
                    ));
                }
                require_at_least_one("site_concurrency", req.site_concurrency)?;
                require_at_least_one("target_concurrency", req.target_concurrency)?;
                require_at_least_one("sitemap_concurrency", req.sitemap_concurrency)?;
                require_at_least_one("css_concurrency", req.css_concurrency)?;
                require_at_least_one("http_concurrency", req.http_concurrency)?;
                require_at_least_one("per_domain_cap", req.per_domain_cap)?;
                require_at_least_one("timeout_secs", req.timeout_secs as usize)?;
                require_at_least_one("max_items", req.max_items)?;
                Ok(())
            }
            JobRequest::Clean(_) => Ok(()),
        }
    }
}

fn require_at_least_one(field: &str, value: usize) -> Result<(), AppError> {
    if value < 1 {
        return Err(AppError::invalid_config(field, "must be at least 1"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub urls: Vec<String>,
    #[serde(default = "default_recent_hours")]
    pub recent_hours: u32,
    #[serde(default = "default_one")]
    pub site_concurrency: usize,
    #[serde(default = "default_detector_concurrency")]
    pub detector_concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    Auto,
    Sitemap,
    Css,
    Both,
}

impl Default for ScrapeMode {
    fn default() -> Self {
        ScrapeMode::Auto
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// Line-delimited selector stream produced by discovery. Mutually
    /// exclusive with `targets_path`.
    #[serde(default)]
    pub stream_path: Option<String>,
    /// Structured targets manifest. Mutually exclusive with `stream_path`.
    #[serde(default)]
    pub targets_path: Option<String>,
    #[serde(default)]
    pub mode: ScrapeMode,
    #[serde(default = "default_one")]
    pub site_concurrency: usize,
    #[serde(default = "default_target_concurrency")]
    pub target_concurrency: usize,
    #[serde(default = "default_sitemap_concurrency")]
    pub sitemap_concurrency: usize,
    #[serde(default = "default_one")]
    pub css_concurrency: usize,
    #[serde(default = "default_http_concurrency")]
    pub http_concurrency: usize,
    #[serde(default = "default_one")]
    pub per_domain_cap: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

impl Default for ScrapeRequest {
    fn default() -> Self {
        Self {
            stream_path: None,
            targets_path: None,
            mode: ScrapeMode::Auto,
            site_concurrency: 1,
            target_concurrency: default_target_concurrency(),
            sitemap_concurrency: default_sitemap_concurrency(),
            css_concurrency: 1,
            http_concurrency: default_http_concurrency(),
            per_domain_cap: 1,
            timeout_secs: default_timeout_secs(),
            max_items: default_max_items(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanRequest {
    #[serde(default)]
    pub input_path: Option<String>,
}

fn default_recent_hours() -> u32 {
    24
}

fn default_one() -> usize {
    1
}

fn default_detector_concurrency() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_depth() -> u32 {
    2
}

fn default_target_concurrency() -> usize {
    6
}

fn default_sitemap_concurrency() -> usize {
    12
}

fn default_http_concurrency() -> usize {
    24
}

fn default_max_items() -> usize {
    500
}

/// Response for an asynchronous submission; the caller is responsible for
/// polling the job afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub message: String,
    pub status: JobStatus,
}

/// How an ingested artifact should be interpreted by a subsequent scrape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Line-delimited input enumerating individual extraction targets
    Stream,
    /// Structured manifest describing sites/selectors as a whole
    Targets,
}

/// A classified, locally resolved input artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceArtifact {
    pub path: PathBuf,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub path: String,
    pub filename: String,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub mode: Option<SourceKind>,
}

/// Per-domain pipeline overview row, maintained by the pipelines and served
/// by the status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteOverview {
    pub domain: String,
    pub discovery_attempted: bool,
    pub sitemap_status: String,
    pub css_fallback_status: String,
    pub extraction_path: String,
    pub leaf_urls_discovered: u64,
    pub raw_articles: u64,
    pub cleaned_articles: u64,
    pub overall_status: String,
    pub last_updated: DateTime<Utc>,
}

impl SiteOverview {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            discovery_attempted: false,
            sitemap_status: "not_attempted".to_string(),
            css_fallback_status: "not_attempted".to_string(),
            extraction_path: "neither".to_string(),
            leaf_urls_discovered: 0,
            raw_articles: 0,
            cleaned_articles: 0,
            overall_status: "pending".to_string(),
            last_updated: Utc::now(),
        }
    }
}

/// Aggregate projection over all known site overviews. Purely derived; not
/// owned by the job core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total_sites: usize,
    pub sites_with_sitemap: usize,
    pub sites_with_css_only: usize,
    pub sites_failed: usize,
    pub total_raw_articles: u64,
    pub total_cleaned_articles: u64,
    pub sites: Vec<SiteOverview>,
    pub last_updated: DateTime<Utc>,
}
