pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_wars;
mod m20260301_000002_create_building_tracking;
mod m20260301_000003_create_subscriptions;
mod m20260301_000004_create_player_stats_snapshots;
mod m20260301_000005_create_job_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_wars::Migration),
            Box::new(m20260301_000002_create_building_tracking::Migration),
            Box::new(m20260301_000003_create_subscriptions::Migration),
            Box::new(m20260301_000004_create_player_stats_snapshots::Migration),
            Box::new(m20260301_000005_create_job_runs::Migration),
        ]
    }
}
