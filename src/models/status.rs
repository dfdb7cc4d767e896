use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::jobs::runner::RunnerState;

#[derive(Debug, Serialize)]
pub struct PipelineStatus {
    pub name: String,
    pub state: RunnerState,
}

#[derive(Debug, Serialize)]
pub struct JobStatus {
    pub job_name: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub success_count: i64,
    pub failure_count: i64,
    pub consecutive_failures: i32,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub pipelines: Vec<PipelineStatus>,
    pub jobs: Vec<JobStatus>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
