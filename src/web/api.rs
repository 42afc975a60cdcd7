use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use super::AppState;
use crate::errors::AppError;
use crate::models::*;

fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn service_info() -> Json<Value> {
    Json(json!({
        "name": "news-harvester",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "discover": "/api/v1/discover",
            "scrape": "/api/v1/scrape",
            "clean": "/api/v1/clean",
            "jobs": "/api/v1/jobs",
            "status": "/api/v1/status",
        },
    }))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// Job submission API
//
// Asynchronous submissions always return success at submission time and
// defer error visibility to the first poll that observes Failed.
// Synchronous submissions return the completed job directly; a failed run
// is a 500, with the terminal record still queryable by id afterwards.

async fn submit_async(
    state: &AppState,
    request: JobRequest,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let job_type = request.job_type();
    match state.scheduler.submit(request, false).await {
        Ok(job) => Ok(Json(SubmitResponse {
            job_id: job.id,
            message: format!("{:?} started", job_type),
            status: job.status,
        })),
        Err(e) => {
            error!("Failed to submit {:?} job: {}", job_type, e);
            Err(status_for(&e))
        }
    }
}

async fn submit_sync(state: &AppState, request: JobRequest) -> Result<Json<Job>, StatusCode> {
    let job_type = request.job_type();
    match state.scheduler.submit(request, true).await {
        Ok(job) if job.status == JobStatus::Failed => {
            error!(
                "{:?} job {} failed: {}",
                job_type,
                job.id,
                job.error.as_deref().unwrap_or("unknown error")
            );
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Ok(job) => Ok(Json(job)),
        Err(e) => {
            error!("Failed to submit {:?} job: {}", job_type, e);
            Err(status_for(&e))
        }
    }
}

pub async fn discover(
    State(state): State<AppState>,
    Json(payload): Json<DiscoveryRequest>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    submit_async(&state, JobRequest::Discover(payload)).await
}

pub async fn discover_sync(
    State(state): State<AppState>,
    Json(payload): Json<DiscoveryRequest>,
) -> Result<Json<Job>, StatusCode> {
    submit_sync(&state, JobRequest::Discover(payload)).await
}

pub async fn scrape(
    State(state): State<AppState>,
    Json(payload): Json<ScrapeRequest>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    submit_async(&state, JobRequest::Scrape(payload)).await
}

pub async fn scrape_sync(
    State(state): State<AppState>,
    Json(payload): Json<ScrapeRequest>,
) -> Result<Json<Job>, StatusCode> {
    submit_sync(&state, JobRequest::Scrape(payload)).await
}

pub async fn clean(
    State(state): State<AppState>,
    Json(payload): Json<CleanRequest>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    submit_async(&state, JobRequest::Clean(payload)).await
}

pub async fn clean_sync(
    State(state): State<AppState>,
    Json(payload): Json<CleanRequest>,
) -> Result<Json<Job>, StatusCode> {
    submit_sync(&state, JobRequest::Clean(payload)).await
}

// Job tracking API

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

pub async fn get_job(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Job>, StatusCode> {
    match state.scheduler.registry().get(id).await {
        Some(job) => Ok(Json(job)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

pub async fn list_jobs(
    Query(params): Query<ListJobsParams>,
    State(state): State<AppState>,
) -> Json<Vec<Job>> {
    let limit = params.limit.unwrap_or(50).min(500);
    Json(state.scheduler.registry().list(params.status, limit).await)
}

pub async fn delete_job(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    if state.scheduler.registry().delete(id).await {
        info!("Deleted job {}", id);
        Ok(Json(json!({"message": "Job deleted", "job_id": id})))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// Status and monitoring API

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub domain: Option<String>,
    pub limit: Option<usize>,
}

pub async fn overall_status(
    Query(params): Query<StatusParams>,
    State(state): State<AppState>,
) -> Json<StatusSummary> {
    let limit = params.limit.unwrap_or(100).min(1000);
    Json(state.overview.summary(params.domain.as_deref(), limit).await)
}

pub async fn sites_status(
    Query(params): Query<StatusParams>,
    State(state): State<AppState>,
) -> Json<Vec<SiteOverview>> {
    let limit = params.limit.unwrap_or(100).min(1000);
    Json(state.overview.sites(params.domain.as_deref(), limit).await)
}

// File ingestion and export API

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub mode: Option<SourceKind>,
}

pub async fn upload_file(
    Query(params): Query<UploadParams>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, StatusCode> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

        return match state
            .intake
            .save_upload(&filename, &data, params.mode)
            .await
        {
            Ok(artifact) => Ok(Json(UploadResponse {
                message: "File uploaded successfully".to_string(),
                path: artifact.path.display().to_string(),
                filename,
                kind: artifact.kind,
            })),
            Err(e) => {
                error!("Upload failed for '{}': {}", filename, e);
                Err(status_for(&e))
            }
        };
    }

    Err(StatusCode::BAD_REQUEST)
}

pub async fn fetch_remote(
    State(state): State<AppState>,
    Json(payload): Json<FetchRequest>,
) -> Result<Json<UploadResponse>, StatusCode> {
    match state.intake.fetch_remote(&payload.url, payload.mode).await {
        Ok(artifact) => Ok(Json(UploadResponse {
            message: "File fetched successfully".to_string(),
            path: artifact.path.display().to_string(),
            filename: artifact
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            kind: artifact.kind,
        })),
        Err(e) => {
            error!("Remote fetch failed for '{}': {}", payload.url, e);
            Err(status_for(&e))
        }
    }
}

pub async fn download_file(
    Path(file_type): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, StatusCode> {
    let path = match file_type.as_str() {
        "selectors" => state.config.storage.selectors_stream_path(),
        "articles" => state.config.storage.articles_path(),
        "cleaned" => state.config.storage.cleaned_articles_path(),
        "overview" => state.config.storage.overview_path(),
        _ => return Err(StatusCode::BAD_REQUEST),
    };

    if !path.exists() {
        return Err(StatusCode::NOT_FOUND);
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        error!("Failed to read artifact {}: {}", path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_type.clone());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
