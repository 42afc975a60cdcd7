use anyhow::Result;
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use news_harvester::{
    config::Config,
    intake::FileIntake,
    jobs::{JobRegistry, JobScheduler},
    models::JobType,
    overview::OverviewStore,
    pipeline::{CleanPipeline, DiscoveryPipeline, PipelineExecutor, ScrapePipeline},
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "news-harvester")]
#[command(version = "0.1.0")]
#[command(about = "A news content-extraction service with job scheduling and progress tracking")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("news_harvester={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting news-harvester v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("news-harvester/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let overview = OverviewStore::load(config.storage.overview_path()).await?;
    info!("Overview store loaded");

    let intake = FileIntake::new(
        config.storage.upload_path.clone(),
        http.clone(),
        Duration::from_secs(config.jobs.fetch_timeout_secs),
    );

    let mut executors: HashMap<JobType, Arc<dyn PipelineExecutor>> = HashMap::new();
    executors.insert(
        JobType::Discover,
        Arc::new(DiscoveryPipeline::new(
            http.clone(),
            overview.clone(),
            config.storage.selectors_stream_path(),
        )),
    );
    executors.insert(
        JobType::Scrape,
        Arc::new(ScrapePipeline::new(
            http.clone(),
            overview.clone(),
            config.storage.selectors_stream_path(),
            config.storage.articles_path(),
            Duration::from_secs(config.jobs.pool_acquire_timeout_secs),
        )),
    );
    executors.insert(
        JobType::Clean,
        Arc::new(CleanPipeline::new(
            overview.clone(),
            config.storage.articles_path(),
            config.storage.cleaned_articles_path(),
        )),
    );

    let registry = JobRegistry::new();
    let scheduler = JobScheduler::new(registry.clone(), executors);
    info!("Job scheduler initialized");

    // Periodic sweep of old terminal jobs.
    let retention_hours = config.jobs.completed_retention_hours;
    let sweep_registry = registry.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            sweep_registry.cleanup_completed(retention_hours).await;
        }
    });

    let web_server = WebServer::new(AppState {
        config,
        scheduler,
        intake,
        overview,
    })?;

    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    web_server.serve().await?;

    Ok(())
}
