//! Web layer module
//!
//! HTTP interface for the news-harvester service: thin axum handlers that
//! delegate to the job scheduler, registry, intake and overview components.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config, intake::FileIntake, jobs::JobScheduler, overview::OverviewStore,
};

pub mod api;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub scheduler: JobScheduler,
    pub intake: FileIntake,
    pub overview: OverviewStore,
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr =
            format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        let app = build_router(state);

        Ok(Self { app, addr })
    }

    /// Start the web server
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Create the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::service_info))
        .route("/health", get(api::health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Job submission
        .route("/discover", post(api::discover))
        .route("/discover/sync", post(api::discover_sync))
        .route("/scrape", post(api::scrape))
        .route("/scrape/sync", post(api::scrape_sync))
        .route("/clean", post(api::clean))
        .route("/clean/sync", post(api::clean_sync))
        // Job tracking for frontend polling
        .route("/jobs", get(api::list_jobs))
        .route("/jobs/:id", get(api::get_job).delete(api::delete_job))
        // Aggregate dashboard views
        .route("/status", get(api::overall_status))
        .route("/sites", get(api::sites_status))
        // Artifact ingestion and export
        .route("/upload", post(api::upload_file))
        .route("/fetch", post(api::fetch_remote))
        .route("/download/:file_type", get(api::download_file))
}
