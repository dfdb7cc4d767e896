mod common;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use clanwatch_backend::error::PipelineError;
use clanwatch_backend::jobs::runner::{Pipeline, PipelineRunner, RunnerConfig};
use clanwatch_backend::services::job_runs;
use clanwatch_backend::{build_router, AppState};

use crate::common::setup_test_db;

struct IdlePipeline;

#[async_trait]
impl Pipeline for IdlePipeline {
    fn name(&self) -> String {
        "war_archiver:#2PPYQ0VU".to_string()
    }

    async fn tick(&self, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        Ok(())
    }
}

async fn build_test_router() -> Router {
    let db = setup_test_db().await.expect("Failed to connect to test DB");
    job_runs::record_outcome(&db, "building_monitor", Ok(())).await.unwrap();
    job_runs::record_outcome(&db, "war_archiver:#2PPYQ0VU", Err("HTTP 503")).await.unwrap();

    let runner = PipelineRunner::new(
        Arc::new(IdlePipeline),
        RunnerConfig {
            interval: std::time::Duration::from_secs(900),
            failure_backoff: std::time::Duration::from_secs(60),
        },
    );

    build_router(AppState {
        db,
        runners: Arc::new(vec![Arc::new(runner)]),
    })
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let app = build_test_router().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_status_lists_pipelines_and_jobs() {
    let app = build_test_router().await;

    let (status, json) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    let pipelines = json["pipelines"].as_array().unwrap();
    assert_eq!(pipelines.len(), 1);
    assert_eq!(pipelines[0]["name"], "war_archiver:#2PPYQ0VU");
    assert_eq!(pipelines[0]["state"], "stopped");

    let jobs = json["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["job_name"], "building_monitor");
    assert_eq!(jobs[0]["success_count"], 1);
    assert_eq!(jobs[1]["last_error"], "HTTP 503");
    assert_eq!(jobs[1]["failure_count"], 1);
    assert_eq!(jobs[1]["consecutive_failures"], 1);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = build_test_router().await;
    let (status, _) = get_json(app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
