//! Bounded concurrency pools
//!
//! A pipeline run instantiates several pools at once: a site pool bounding
//! how many site-level jobs run simultaneously, and nested target, sitemap,
//! css and http pools bounding finer-grained operations within a site. Pools
//! are independent; exhausting one never blocks acquisition on another.
//!
//! Lock ordering: coarser pools (site) are always acquired before the finer
//! pools (target, fetch) nested within them, never the reverse.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::errors::{AppError, PipelineError};
use crate::models::ScrapeRequest;

/// A held execution slot. The slot is returned exactly once, when the token
/// drops, on every exit path.
pub struct PoolToken {
    _permit: OwnedSemaphorePermit,
}

/// A bounded set of reusable execution slots for one resource dimension.
#[derive(Clone)]
pub struct ConcurrencyPool {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyPool {
    pub fn new<S: Into<String>>(name: S, capacity: usize) -> Result<Self, AppError> {
        let name = name.into();
        if capacity < 1 {
            return Err(AppError::invalid_config(
                name,
                "pool capacity must be at least 1",
            ));
        }
        Ok(Self {
            name,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free; `capacity - available` slots are held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait until a slot is free.
    pub async fn acquire(&self) -> Result<PoolToken, PipelineError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::execution(&self.name, "pool closed"))?;
        Ok(PoolToken { _permit: permit })
    }

    /// Wait until a slot is free, giving up after `wait`.
    pub async fn acquire_timeout(&self, wait: Duration) -> Result<PoolToken, PipelineError> {
        match tokio::time::timeout(wait, self.acquire()).await {
            Ok(token) => token,
            Err(_) => Err(PipelineError::pool_timeout(
                &self.name,
                wait.as_millis() as u64,
            )),
        }
    }
}

/// A pool keyed by domain name: at most `cap` concurrent operations per
/// distinct domain, with an independent counter per domain value.
#[derive(Clone)]
pub struct DomainPool {
    cap: usize,
    slots: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl DomainPool {
    pub fn new(cap: usize) -> Result<Self, AppError> {
        if cap < 1 {
            return Err(AppError::invalid_config(
                "per_domain_cap",
                "pool capacity must be at least 1",
            ));
        }
        Ok(Self {
            cap,
            slots: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub async fn acquire(&self, domain: &str) -> Result<PoolToken, PipelineError> {
        let semaphore = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(domain.to_ascii_lowercase())
                .or_insert_with(|| Arc::new(Semaphore::new(self.cap)))
                .clone()
        };

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::execution("per_domain", "pool closed"))?;
        Ok(PoolToken { _permit: permit })
    }
}

/// Extract the host from a URL for per-domain capping; falls back to the raw
/// string when it does not parse as a URL.
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_else(|| url.trim().to_ascii_lowercase())
}

/// The pool set one scrape run instantiates, with capacities taken from the
/// request's concurrency configuration. Destroyed when the job's background
/// work finishes.
#[derive(Clone)]
pub struct ScrapePools {
    pub site: ConcurrencyPool,
    pub target: ConcurrencyPool,
    pub sitemap: ConcurrencyPool,
    pub css: ConcurrencyPool,
    pub http: ConcurrencyPool,
    pub per_domain: DomainPool,
}

impl ScrapePools {
    pub fn from_request(request: &ScrapeRequest) -> Result<Self, AppError> {
        Ok(Self {
            site: ConcurrencyPool::new("site", request.site_concurrency)?,
            target: ConcurrencyPool::new("target", request.target_concurrency)?,
            sitemap: ConcurrencyPool::new("sitemap", request.sitemap_concurrency)?,
            css: ConcurrencyPool::new("css", request.css_concurrency)?,
            http: ConcurrencyPool::new("http", request.http_concurrency)?,
            per_domain: DomainPool::new(request.per_domain_cap)?,
        })
    }
}
