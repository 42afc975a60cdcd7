use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use news_harvester::config::Config;
use news_harvester::errors::PipelineError;
use news_harvester::intake::FileIntake;
use news_harvester::jobs::{JobRegistry, JobScheduler, ProgressHandle};
use news_harvester::models::{JobRequest, JobType};
use news_harvester::overview::OverviewStore;
use news_harvester::pipeline::PipelineExecutor;
use news_harvester::web::{build_router, AppState};

struct InstantExecutor;

#[async_trait]
impl PipelineExecutor for InstantExecutor {
    async fn execute(
        &self,
        _request: &JobRequest,
        progress: ProgressHandle,
    ) -> Result<Value, PipelineError> {
        progress.report(100).await;
        Ok(json!({"done": true}))
    }
}

struct FailingExecutor;

#[async_trait]
impl PipelineExecutor for FailingExecutor {
    async fn execute(
        &self,
        _request: &JobRequest,
        _progress: ProgressHandle,
    ) -> Result<Value, PipelineError> {
        Err(PipelineError::execution("stub", "simulated failure"))
    }
}

async fn test_app() -> Router {
    test_app_with(Arc::new(InstantExecutor)).await
}

async fn test_app_with(executor: Arc<dyn PipelineExecutor>) -> Router {
    let mut config = Config::default();
    let base = std::env::temp_dir()
        .join("news-harvester-tests")
        .join(format!("api-{}", Uuid::new_v4()));
    config.storage.data_path = base.join("data");
    config.storage.upload_path = base.join("uploads");

    let http = reqwest::Client::new();
    let overview = OverviewStore::load(config.storage.overview_path())
        .await
        .unwrap();
    let intake = FileIntake::new(
        config.storage.upload_path.clone(),
        http,
        Duration::from_secs(5),
    );

    let mut executors: HashMap<JobType, Arc<dyn PipelineExecutor>> = HashMap::new();
    executors.insert(JobType::Discover, executor.clone());
    executors.insert(JobType::Scrape, executor.clone());
    executors.insert(JobType::Clean, executor);
    let scheduler = JobScheduler::new(JobRegistry::new(), executors);

    build_router(AppState {
        config,
        scheduler,
        intake,
        overview,
    })
}

// Helper function to send requests to the app
async fn send_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request_builder = Request::builder().method(method).uri(uri);

    let request = if let Some(body) = body {
        request_builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };

    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let (status, response) = send_request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "healthy");
    assert!(response.get("timestamp").is_some());
}

#[tokio::test]
async fn test_service_info() {
    let app = test_app().await;

    let (status, response) = send_request(&app, Method::GET, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["name"], "news-harvester");
    assert!(response["endpoints"].get("discover").is_some());
}

#[tokio::test]
async fn test_async_submit_and_poll() {
    let app = test_app().await;

    let (status, response) = send_request(
        &app,
        Method::POST,
        "/api/v1/discover",
        Some(json!({"urls": ["https://example.com"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "running");
    let job_id = response["job_id"].as_str().unwrap().to_string();

    // Poll until the stub executor finishes.
    let mut last = json!({});
    for _ in 0..100 {
        let (status, job) =
            send_request(&app, Method::GET, &format!("/api/v1/jobs/{}", job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        last = job.clone();
        if job["status"] == "completed" || job["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(last["status"], "completed");
    assert_eq!(last["progress"], 100);
    assert_eq!(last["result"]["done"], true);
}

#[tokio::test]
async fn test_sync_submit_returns_terminal_job() {
    let app = test_app().await;

    let (status, response) =
        send_request(&app, Method::POST, "/api/v1/clean/sync", Some(json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "completed");
    assert_eq!(response["type"], "clean");
    assert!(response.get("result").is_some());
}

#[tokio::test]
async fn test_sync_failure_is_a_server_error_with_a_terminal_record() {
    let app = test_app_with(Arc::new(FailingExecutor)).await;

    let (status, _) =
        send_request(&app, Method::POST, "/api/v1/clean/sync", Some(json!({}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // The failed record is still in the registry and queryable.
    let (status, jobs) = send_request(&app, Method::GET, "/api/v1/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = jobs.as_array().unwrap().clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["status"], "failed");
    assert!(jobs[0]["error"]
        .as_str()
        .unwrap()
        .contains("simulated failure"));
}

#[tokio::test]
async fn test_invalid_config_is_a_bad_request() {
    let app = test_app().await;

    let (status, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/discover",
        Some(json!({"urls": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/scrape",
        Some(json!({
            "stream_path": "a.jsonl",
            "targets_path": "b.json"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_job_listing_and_filtering() {
    let app = test_app().await;

    send_request(&app, Method::POST, "/api/v1/clean/sync", Some(json!({}))).await;
    send_request(&app, Method::POST, "/api/v1/clean/sync", Some(json!({}))).await;

    let (status, jobs) = send_request(&app, Method::GET, "/api/v1/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 2);

    let (status, completed) =
        send_request(&app, Method::GET, "/api/v1/jobs?status=completed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed.as_array().unwrap().len(), 2);

    let (status, failed) =
        send_request(&app, Method::GET, "/api/v1/jobs?status=failed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(failed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_job_then_not_found() {
    let app = test_app().await;

    let (_, job) =
        send_request(&app, Method::POST, "/api/v1/clean/sync", Some(json!({}))).await;
    let job_id = job["id"].as_str().unwrap().to_string();

    let (status, _) = send_request(
        &app,
        Method::DELETE,
        &format!("/api/v1/jobs/{}", job_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        send_request(&app, Method::GET, &format!("/api/v1/jobs/{}", job_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_request(
        &app,
        Method::DELETE,
        &format!("/api/v1/jobs/{}", job_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = test_app().await;

    let (status, _) = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/jobs/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_summary_starts_empty() {
    let app = test_app().await;

    let (status, summary) = send_request(&app, Method::GET, "/api/v1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_sites"], 0);
    assert_eq!(summary["total_raw_articles"], 0);
    assert!(summary["sites"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_download_validation() {
    let app = test_app().await;

    let (status, _) =
        send_request(&app, Method::GET, "/api/v1/download/bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Known artifact type, but nothing has been produced yet.
    let (status, _) =
        send_request(&app, Method::GET, "/api/v1/download/articles", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
