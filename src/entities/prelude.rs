//! `SeaORM` Entity prelude

pub use super::building_snapshots::Entity as BuildingSnapshots;
pub use super::building_trackers::Entity as BuildingTrackers;
pub use super::job_runs::Entity as JobRuns;
pub use super::player_stats_snapshots::Entity as PlayerStatsSnapshots;
pub use super::subscriptions::Entity as Subscriptions;
pub use super::war_attacks::Entity as WarAttacks;
pub use super::war_notification_subscribers::Entity as WarNotificationSubscribers;
pub use super::wars::Entity as Wars;
