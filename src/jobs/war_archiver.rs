use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::jobs::runner::{Pipeline, PipelineRunner, RunnerConfig};
use crate::services::job_runs::jobs;
use crate::services::war_detector::{WarChangeDetector, WarCheck};

/// War archiver for one clan: war-log sweep on start, then the current-war check every tick.
pub struct WarArchiverPipeline {
    detector: Arc<WarChangeDetector>,
}

impl WarArchiverPipeline {
    pub fn new(detector: Arc<WarChangeDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl Pipeline for WarArchiverPipeline {
    fn name(&self) -> String {
        jobs::for_clan(jobs::WAR_ARCHIVER, self.detector.clan_tag())
    }

    async fn catch_up(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        tracing::info!("Sweeping war log for {}", self.detector.clan_tag());
        self.detector.sweep_war_log(cancel).await.map(|_| ())
    }

    async fn tick(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        match self.detector.run_tick(cancel).await? {
            WarCheck::Ended { archived: true } => {
                tracing::info!("War archived for {}", self.detector.clan_tag())
            }
            WarCheck::Preparation { notified: true } => {
                tracing::info!("War starting notice sent for {}", self.detector.clan_tag())
            }
            check => tracing::debug!("War check for {}: {:?}", self.detector.clan_tag(), check),
        }
        Ok(())
    }
}

pub fn war_archiver_runner(
    detector: Arc<WarChangeDetector>,
    interval: Duration,
    failure_backoff: Duration,
) -> PipelineRunner {
    PipelineRunner::new(
        Arc::new(WarArchiverPipeline::new(detector)),
        RunnerConfig {
            interval,
            failure_backoff,
        },
    )
}
