use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clanwatch_backend::config::WatchConfig;
use clanwatch_backend::jobs::building_monitor::building_monitor_runner;
use clanwatch_backend::jobs::runner::PipelineRunner;
use clanwatch_backend::jobs::war_archiver::war_archiver_runner;
use clanwatch_backend::services::archive::{ArchiveGateway, SeaOrmArchive};
use clanwatch_backend::services::building_detector::BuildingMonitor;
use clanwatch_backend::services::coc_api::{CocApiService, UpstreamApi};
use clanwatch_backend::services::notifier::{BroadcastNotifier, Notifier};
use clanwatch_backend::services::war_detector::WarChangeDetector;
use clanwatch_backend::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clanwatch_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None).await?;

    let api: Arc<dyn UpstreamApi> = Arc::new(CocApiService::new(config.coc_api_config())?);
    let archive: Arc<dyn ArchiveGateway> = Arc::new(SeaOrmArchive::new(db.clone()));
    let bus = BroadcastNotifier::new(config.event_bus_capacity);
    spawn_dispatch_logger(&bus);
    let notifier: Arc<dyn Notifier> = Arc::new(bus);

    let mut runners: Vec<Arc<PipelineRunner>> = Vec::new();

    for clan_tag in &config.clan_tags {
        let detector = WarChangeDetector::new(
            clan_tag.clone(),
            api.clone(),
            archive.clone(),
            notifier.clone(),
        )
        .with_donation_interval(config.donation_snapshot_interval_secs);

        runners.push(Arc::new(war_archiver_runner(
            Arc::new(detector),
            config.war_check_interval,
            config.failure_backoff,
        )));
    }

    let monitor = BuildingMonitor::new(api.clone(), archive.clone(), notifier.clone());
    runners.push(Arc::new(building_monitor_runner(
        Arc::new(monitor),
        config.building_check_interval,
        config.failure_backoff,
    )));

    if config.clan_tags.is_empty() {
        tracing::warn!("CLAN_TAGS is empty, only the building monitor will run");
    }

    for runner in &runners {
        runner.start();
    }

    let runners = Arc::new(runners);
    let state = AppState {
        db,
        runners: runners.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Ops server listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    for runner in runners.iter() {
        runner.stop().await;
    }

    tracing::info!("All pipelines stopped");
    Ok(())
}

/// Until a chat transport subscribes, dispatches are written to the log.
fn spawn_dispatch_logger(bus: &BroadcastNotifier) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(dispatch) => match serde_json::to_string(&dispatch.event) {
                    Ok(payload) => tracing::info!(
                        "Dispatch {} to {:?}: {}",
                        dispatch.event.kind(),
                        dispatch.recipients,
                        payload
                    ),
                    Err(e) => tracing::warn!("Could not serialize dispatch: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dispatch logger lagged, skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
