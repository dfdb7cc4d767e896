//! Start/stop lifecycle shared by every background pipeline.
//!
//! A runner owns at most one loop task. The loop ticks on a fixed interval,
//! never overlaps ticks, sleeps for the failure backoff after a failed
//! tick, and exits at the next sleep or fetch wait once stopped. A tick in
//! progress always runs to completion.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// One unit of periodic work.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Runs once before the first tick.
    async fn catch_up(&self, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn tick(&self, cancel: &CancellationToken) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    pub interval: Duration,
    pub failure_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Stopped,
    Running,
    Stopping,
}

enum Slot {
    Stopped,
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopping,
}

pub struct PipelineRunner {
    name: String,
    pipeline: Arc<dyn Pipeline>,
    config: RunnerConfig,
    slot: Mutex<Slot>,
}

impl PipelineRunner {
    /// A zero interval is raised to one second.
    pub fn new(pipeline: Arc<dyn Pipeline>, mut config: RunnerConfig) -> Self {
        let name = pipeline.name();
        if config.interval < MIN_INTERVAL {
            tracing::warn!(
                "[{}] Interval {:?} too short, using {:?}",
                name,
                config.interval,
                MIN_INTERVAL
            );
            config.interval = MIN_INTERVAL;
        }
        Self {
            name,
            pipeline,
            config,
            slot: Mutex::new(Slot::Stopped),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RunnerState {
        match &*self.slot.lock() {
            Slot::Stopped => RunnerState::Stopped,
            Slot::Running { handle, .. } if handle.is_finished() => RunnerState::Stopped,
            Slot::Running { .. } => RunnerState::Running,
            Slot::Stopping => RunnerState::Stopping,
        }
    }

    /// Spawns the loop. Returns `false` if it is already running or stopping.
    pub fn start(&self) -> bool {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Running { handle, .. } if !handle.is_finished() => {
                tracing::warn!("[{}] Already running, start ignored", self.name);
                return false;
            }
            Slot::Stopping => {
                tracing::warn!("[{}] Still stopping, start ignored", self.name);
                return false;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.name.clone(),
            self.pipeline.clone(),
            self.config,
            cancel.clone(),
        ));
        *slot = Slot::Running { cancel, handle };
        true
    }

    /// Signals the loop and waits for it to exit. No-op when not running.
    pub async fn stop(&self) {
        let (cancel, handle) = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Stopping) {
                Slot::Running { cancel, handle } => (cancel, handle),
                other => {
                    *slot = other;
                    tracing::debug!("[{}] Not running, stop ignored", self.name);
                    return;
                }
            }
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!("[{}] Pipeline task ended abnormally: {}", self.name, e);
        }

        *self.slot.lock() = Slot::Stopped;
        tracing::info!("[{}] Stopped", self.name);
    }
}

async fn run_loop(
    name: String,
    pipeline: Arc<dyn Pipeline>,
    config: RunnerConfig,
    cancel: CancellationToken,
) {
    tracing::info!(
        "[{}] Started (interval {:?}, backoff {:?})",
        name,
        config.interval,
        config.failure_backoff
    );

    match pipeline.catch_up(&cancel).await {
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::warn!("[{}] Catch-up failed: {}", name, e),
        Ok(()) => {}
    }

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match pipeline.tick(&cancel).await {
            Ok(()) => tracing::debug!("[{}] Tick complete", name),
            Err(e) if e.is_cancelled() => {
                tracing::debug!("[{}] Tick interrupted by shutdown", name);
                break;
            }
            Err(e) => {
                tracing::error!(
                    "[{}] Tick failed: {}. Backing off {:?}",
                    name,
                    e,
                    config.failure_backoff
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sleep(config.failure_backoff) => {}
                }
            }
        }
    }

    tracing::info!("[{}] Loop exited", name);
}
