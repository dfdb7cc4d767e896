use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::jobs::runner::{Pipeline, PipelineRunner, RunnerConfig};
use crate::services::building_detector::BuildingMonitor;
use crate::services::job_runs::jobs;

/// Single pipeline covering every active tracker.
pub struct BuildingMonitorPipeline {
    monitor: Arc<BuildingMonitor>,
}

impl BuildingMonitorPipeline {
    pub fn new(monitor: Arc<BuildingMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Pipeline for BuildingMonitorPipeline {
    fn name(&self) -> String {
        jobs::BUILDING_MONITOR.to_string()
    }

    async fn tick(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let report = self.monitor.run_tick(cancel).await?;
        if report.upgrades > 0 || report.deactivated > 0 {
            tracing::info!(
                "Building monitor: {} upgrades across {} trackers, {} deactivated",
                report.upgrades,
                report.checked,
                report.deactivated
            );
        }
        Ok(())
    }
}

pub fn building_monitor_runner(
    monitor: Arc<BuildingMonitor>,
    interval: Duration,
    failure_backoff: Duration,
) -> PipelineRunner {
    PipelineRunner::new(
        Arc::new(BuildingMonitorPipeline::new(monitor)),
        RunnerConfig {
            interval,
            failure_backoff,
        },
    )
}
