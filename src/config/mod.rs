use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub web: WebConfig,
    pub storage: StorageConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_path: PathBuf,
    pub upload_path: PathBuf,
}

impl StorageConfig {
    /// Selector stream produced by discovery, consumed by scraping.
    pub fn selectors_stream_path(&self) -> PathBuf {
        self.data_path.join("selection_extraction_stream.jsonl")
    }

    /// Raw scraped articles, consumed by cleaning.
    pub fn articles_path(&self) -> PathBuf {
        self.data_path.join("stream_scraped_articles.jsonl")
    }

    /// Cleaned article set.
    pub fn cleaned_articles_path(&self) -> PathBuf {
        self.data_path.join("articles_clean_current.jsonl")
    }

    /// Persisted per-domain overview rows.
    pub fn overview_path(&self) -> PathBuf {
        self.data_path.join("pipelines_overview.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Default per-operation timeout for network-bound sub-operations
    pub fetch_timeout_secs: u64,
    /// Upper bound on waiting for a concurrency pool slot
    pub pool_acquire_timeout_secs: u64,
    /// Terminal jobs older than this are swept from the registry
    pub completed_retention_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            storage: StorageConfig {
                data_path: PathBuf::from("./data"),
                upload_path: PathBuf::from("./data/uploads"),
            },
            jobs: JobsConfig {
                fetch_timeout_secs: 15,
                pool_acquire_timeout_secs: 120,
                completed_retention_hours: 24,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.storage.data_path)?;
            std::fs::create_dir_all(&default_config.storage.upload_path)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}
