// src/lib.rs

use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use jobs::runner::PipelineRunner;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub runners: Arc<Vec<Arc<PipelineRunner>>>,
}

pub mod entities {
    pub mod prelude;
    pub mod building_snapshots;
    pub mod building_trackers;
    pub mod job_runs;
    pub mod player_stats_snapshots;
    pub mod subscriptions;
    pub mod war_attacks;
    pub mod war_notification_subscribers;
    pub mod wars;
}

pub mod services {
    pub mod archive;
    pub mod building_detector;
    pub mod coc_api;
    pub mod job_runs;
    pub mod notifier;
    pub mod war_detector;
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;

/// Ops surface: liveness plus pipeline and job status.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::status::health))
        .route("/status", get(handlers::status::get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
