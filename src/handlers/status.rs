use axum::{extract::State, http::StatusCode, Json};

use crate::models::status::{ErrorResponse, JobStatus, PipelineStatus, StatusResponse};
use crate::services::job_runs;
use crate::AppState;

/// Handler for GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Handler for GET /status
/// Runner states plus the persisted audit of every job
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let pipelines = state
        .runners
        .iter()
        .map(|runner| PipelineStatus {
            name: runner.name().to_string(),
            state: runner.state(),
        })
        .collect();

    let rows = job_runs::list_all(&state.db).await.map_err(|e| {
        tracing::error!("Failed to load job runs: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Database error: {}", e),
            }),
        )
    })?;

    let jobs = rows
        .into_iter()
        .map(|row| JobStatus {
            job_name: row.job_name,
            last_success_at: row.last_success_at,
            last_attempt_at: row.last_attempt_at,
            last_error: row.last_error,
            success_count: row.success_count,
            failure_count: row.failure_count,
            consecutive_failures: row.consecutive_failures,
        })
        .collect();

    Ok(Json(StatusResponse { pipelines, jobs }))
}
