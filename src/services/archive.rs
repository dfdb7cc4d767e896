//! Persistence gateway for archived wars, building snapshots and trackers.
//!
//! The detectors only see [`ArchiveGateway`]; [`SeaOrmArchive`] is the
//! database-backed implementation used in production and in the
//! integration tests (against SQLite).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::entities::prelude::*;
use crate::entities::{
    building_snapshots, building_trackers, player_stats_snapshots, war_attacks,
    war_notification_subscribers, wars,
};
use crate::error::ArchiveError;
use crate::models::event::RecipientId;
use crate::models::player::{BuildingMap, BuildingSnapshot};
use crate::models::tracker::{ClanMember, Tracker};
use crate::models::war::{ArchivedAttack, ArchivedWar, WarResult};
use crate::services::job_runs;

#[async_trait]
pub trait ArchiveGateway: Send + Sync {
    async fn war_exists(&self, end_time: &str) -> Result<bool, ArchiveError>;

    /// Stores a war and its attacks atomically. Re-saving the same
    /// `end_time` replaces the previous record instead of duplicating it.
    async fn save_war(&self, war: &ArchivedWar) -> Result<(), ArchiveError>;

    async fn latest_building_snapshot(
        &self,
        player_tag: &str,
    ) -> Result<Option<BuildingSnapshot>, ArchiveError>;

    /// Replaces the stored snapshot for `snapshot.player_tag`.
    async fn save_building_snapshot(&self, snapshot: &BuildingSnapshot) -> Result<(), ArchiveError>;

    async fn list_active_trackers(&self) -> Result<Vec<Tracker>, ArchiveError>;

    async fn find_tracker(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<Option<Tracker>, ArchiveError>;

    /// Creates the tracker, or reactivates an existing one for the same pair.
    async fn save_tracker(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<Tracker, ArchiveError>;

    async fn deactivate_tracker(&self, tracker_id: i32) -> Result<(), ArchiveError>;

    async fn touch_tracker(&self, tracker_id: i32, checked_at: DateTime<Utc>) -> Result<(), ArchiveError>;

    async fn list_active_war_subscribers(&self) -> Result<Vec<RecipientId>, ArchiveError>;

    async fn is_entitlement_active(&self, telegram_id: RecipientId) -> Result<bool, ArchiveError>;

    async fn save_donation_snapshot(
        &self,
        clan_tag: &str,
        taken_at: DateTime<Utc>,
        members: &[ClanMember],
    ) -> Result<(), ArchiveError>;

    /// Whether `job_name` last succeeded at least `min_interval_secs` ago.
    async fn should_sync(&self, job_name: &str, min_interval_secs: i64) -> Result<bool, ArchiveError>;

    async fn record_job_result(&self, job_name: &str, outcome: Result<(), String>) -> Result<(), ArchiveError>;
}

#[derive(Clone)]
pub struct SeaOrmArchive {
    db: DatabaseConnection,
}

impl SeaOrmArchive {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Reads an archived war back with its attacks in order.
    pub async fn load_war(&self, end_time: &str) -> Result<Option<ArchivedWar>, ArchiveError> {
        let Some(war) = Wars::find_by_id(end_time.to_string()).one(&self.db).await? else {
            return Ok(None);
        };

        let attacks = WarAttacks::find()
            .filter(war_attacks::Column::WarEndTime.eq(end_time))
            .order_by_asc(war_attacks::Column::AttackOrder)
            .all(&self.db)
            .await?;

        Ok(Some(war_from_rows(war, attacks)))
    }

    /// Donation rows stored for a clan, oldest snapshot first.
    pub async fn donation_rows(&self, clan_tag: &str) -> Result<Vec<player_stats_snapshots::Model>, ArchiveError> {
        Ok(PlayerStatsSnapshots::find()
            .filter(player_stats_snapshots::Column::ClanTag.eq(clan_tag))
            .order_by_asc(player_stats_snapshots::Column::SnapshotTime)
            .order_by_asc(player_stats_snapshots::Column::PlayerTag)
            .all(&self.db)
            .await?)
    }
}

fn war_from_rows(war: wars::Model, attacks: Vec<war_attacks::Model>) -> ArchivedWar {
    let result = WarResult::from_str(&war.result).unwrap_or_else(|| {
        tracing::warn!("Unknown war result '{}' stored for {}", war.result, war.end_time);
        WarResult::Tie
    });

    ArchivedWar {
        end_time: war.end_time,
        clan_tag: war.clan_tag,
        opponent_name: war.opponent_name,
        opponent_tag: war.opponent_tag,
        team_size: war.team_size as u32,
        clan_stars: war.clan_stars as u32,
        opponent_stars: war.opponent_stars as u32,
        clan_destruction: war.clan_destruction,
        opponent_destruction: war.opponent_destruction,
        clan_attacks_used: war.clan_attacks_used as u32,
        result,
        is_cwl_war: war.is_cwl_war,
        total_violations: war.total_violations as u32,
        attacks: attacks
            .into_iter()
            .map(|a| ArchivedAttack {
                order: a.attack_order as u32,
                attacker_tag: a.attacker_tag,
                attacker_name: a.attacker_name,
                attacker_map_position: a.attacker_map_position.map(|p| p as u32),
                defender_tag: a.defender_tag,
                defender_map_position: a.defender_map_position.map(|p| p as u32),
                stars: a.stars as u32,
                destruction: a.destruction,
                is_violation: a.is_violation,
            })
            .collect(),
    }
}

fn tracker_from_model(model: building_trackers::Model) -> Tracker {
    Tracker {
        id: model.id,
        telegram_id: model.telegram_id,
        player_tag: model.player_tag,
        is_active: model.is_active,
        created_at: model.created_at,
        last_checked_at: model.last_checked_at,
    }
}

#[async_trait]
impl ArchiveGateway for SeaOrmArchive {
    async fn war_exists(&self, end_time: &str) -> Result<bool, ArchiveError> {
        let existing = Wars::find_by_id(end_time.to_string()).one(&self.db).await?;
        Ok(existing.is_some())
    }

    async fn save_war(&self, war: &ArchivedWar) -> Result<(), ArchiveError> {
        let txn = self.db.begin().await?;

        let war_model = wars::ActiveModel {
            end_time: Set(war.end_time.clone()),
            clan_tag: Set(war.clan_tag.clone()),
            opponent_name: Set(war.opponent_name.clone()),
            opponent_tag: Set(war.opponent_tag.clone()),
            team_size: Set(war.team_size as i32),
            clan_stars: Set(war.clan_stars as i32),
            opponent_stars: Set(war.opponent_stars as i32),
            clan_destruction: Set(war.clan_destruction),
            opponent_destruction: Set(war.opponent_destruction),
            clan_attacks_used: Set(war.clan_attacks_used as i32),
            result: Set(war.result.as_str().to_string()),
            is_cwl_war: Set(war.is_cwl_war),
            total_violations: Set(war.total_violations as i32),
            archived_at: Set(Utc::now()),
        };

        Wars::insert(war_model)
            .on_conflict(
                OnConflict::column(wars::Column::EndTime)
                    .update_columns([
                        wars::Column::ClanTag,
                        wars::Column::OpponentName,
                        wars::Column::OpponentTag,
                        wars::Column::TeamSize,
                        wars::Column::ClanStars,
                        wars::Column::OpponentStars,
                        wars::Column::ClanDestruction,
                        wars::Column::OpponentDestruction,
                        wars::Column::ClanAttacksUsed,
                        wars::Column::Result,
                        wars::Column::IsCwlWar,
                        wars::Column::TotalViolations,
                        wars::Column::ArchivedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        // Attacks are replaced wholesale so a re-save never duplicates them
        WarAttacks::delete_many()
            .filter(war_attacks::Column::WarEndTime.eq(war.end_time.as_str()))
            .exec(&txn)
            .await?;

        if !war.attacks.is_empty() {
            let attack_models: Vec<war_attacks::ActiveModel> = war
                .attacks
                .iter()
                .map(|attack| war_attacks::ActiveModel {
                    war_end_time: Set(war.end_time.clone()),
                    attack_order: Set(attack.order as i32),
                    attacker_tag: Set(attack.attacker_tag.clone()),
                    attacker_name: Set(attack.attacker_name.clone()),
                    attacker_map_position: Set(attack.attacker_map_position.map(|p| p as i32)),
                    defender_tag: Set(attack.defender_tag.clone()),
                    defender_map_position: Set(attack.defender_map_position.map(|p| p as i32)),
                    stars: Set(attack.stars as i32),
                    destruction: Set(attack.destruction),
                    is_violation: Set(attack.is_violation),
                    ..Default::default()
                })
                .collect();

            WarAttacks::insert_many(attack_models)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        tracing::debug!(
            "Saved war {} for {} with {} attacks",
            war.end_time,
            war.clan_tag,
            war.attacks.len()
        );
        Ok(())
    }

    async fn latest_building_snapshot(
        &self,
        player_tag: &str,
    ) -> Result<Option<BuildingSnapshot>, ArchiveError> {
        let Some(row) = BuildingSnapshots::find_by_id(player_tag.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let buildings: BuildingMap =
            serde_json::from_value(row.buildings).map_err(|source| ArchiveError::CorruptSnapshot {
                player_tag: row.player_tag.clone(),
                source,
            })?;

        Ok(Some(BuildingSnapshot {
            player_tag: row.player_tag,
            buildings,
            captured_at: row.captured_at,
        }))
    }

    async fn save_building_snapshot(&self, snapshot: &BuildingSnapshot) -> Result<(), ArchiveError> {
        let buildings = serde_json::to_value(&snapshot.buildings).map_err(|source| {
            ArchiveError::CorruptSnapshot {
                player_tag: snapshot.player_tag.clone(),
                source,
            }
        })?;

        let model = building_snapshots::ActiveModel {
            player_tag: Set(snapshot.player_tag.clone()),
            buildings: Set(buildings),
            captured_at: Set(snapshot.captured_at),
        };

        BuildingSnapshots::insert(model)
            .on_conflict(
                OnConflict::column(building_snapshots::Column::PlayerTag)
                    .update_columns([
                        building_snapshots::Column::Buildings,
                        building_snapshots::Column::CapturedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn list_active_trackers(&self) -> Result<Vec<Tracker>, ArchiveError> {
        let rows = BuildingTrackers::find()
            .filter(building_trackers::Column::IsActive.eq(true))
            .order_by_asc(building_trackers::Column::Id)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(tracker_from_model).collect())
    }

    async fn find_tracker(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<Option<Tracker>, ArchiveError> {
        let row = BuildingTrackers::find()
            .filter(building_trackers::Column::TelegramId.eq(telegram_id))
            .filter(building_trackers::Column::PlayerTag.eq(player_tag))
            .one(&self.db)
            .await?;

        Ok(row.map(tracker_from_model))
    }

    async fn save_tracker(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<Tracker, ArchiveError> {
        let existing = BuildingTrackers::find()
            .filter(building_trackers::Column::TelegramId.eq(telegram_id))
            .filter(building_trackers::Column::PlayerTag.eq(player_tag))
            .one(&self.db)
            .await?;

        let model = match existing {
            Some(row) if row.is_active => row,
            Some(row) => {
                let mut active_model: building_trackers::ActiveModel = row.into();
                active_model.is_active = Set(true);
                active_model.update(&self.db).await?
            }
            None => {
                building_trackers::ActiveModel {
                    telegram_id: Set(telegram_id),
                    player_tag: Set(player_tag.to_string()),
                    is_active: Set(true),
                    created_at: Set(Utc::now()),
                    last_checked_at: Set(None),
                    ..Default::default()
                }
                .insert(&self.db)
                .await?
            }
        };

        Ok(tracker_from_model(model))
    }

    async fn deactivate_tracker(&self, tracker_id: i32) -> Result<(), ArchiveError> {
        BuildingTrackers::update_many()
            .col_expr(building_trackers::Column::IsActive, Expr::value(false))
            .filter(building_trackers::Column::Id.eq(tracker_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn touch_tracker(&self, tracker_id: i32, checked_at: DateTime<Utc>) -> Result<(), ArchiveError> {
        BuildingTrackers::update_many()
            .col_expr(building_trackers::Column::LastCheckedAt, Expr::value(checked_at))
            .filter(building_trackers::Column::Id.eq(tracker_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_active_war_subscribers(&self) -> Result<Vec<RecipientId>, ArchiveError> {
        let rows = WarNotificationSubscribers::find()
            .order_by_asc(war_notification_subscribers::Column::TelegramId)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|row| row.telegram_id).collect())
    }

    async fn is_entitlement_active(&self, telegram_id: RecipientId) -> Result<bool, ArchiveError> {
        let subscription = Subscriptions::find_by_id(telegram_id).one(&self.db).await?;
        Ok(subscription
            .map(|s| s.is_entitled_at(Utc::now()))
            .unwrap_or(false))
    }

    async fn save_donation_snapshot(
        &self,
        clan_tag: &str,
        taken_at: DateTime<Utc>,
        members: &[ClanMember],
    ) -> Result<(), ArchiveError> {
        if members.is_empty() {
            return Ok(());
        }

        let rows: Vec<player_stats_snapshots::ActiveModel> = members
            .iter()
            .map(|member| player_stats_snapshots::ActiveModel {
                snapshot_time: Set(taken_at),
                player_tag: Set(member.tag.clone()),
                clan_tag: Set(clan_tag.to_string()),
                donations: Set(member.donations),
                donations_received: Set(member.donations_received),
            })
            .collect();

        PlayerStatsSnapshots::insert_many(rows)
            .on_conflict(
                OnConflict::columns([
                    player_stats_snapshots::Column::SnapshotTime,
                    player_stats_snapshots::Column::PlayerTag,
                ])
                .update_columns([
                    player_stats_snapshots::Column::ClanTag,
                    player_stats_snapshots::Column::Donations,
                    player_stats_snapshots::Column::DonationsReceived,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        tracing::debug!("Stored donation snapshot of {} members for {}", members.len(), clan_tag);
        Ok(())
    }

    async fn should_sync(&self, job_name: &str, min_interval_secs: i64) -> Result<bool, ArchiveError> {
        Ok(job_runs::is_due(&self.db, job_name, min_interval_secs).await?)
    }

    async fn record_job_result(&self, job_name: &str, outcome: Result<(), String>) -> Result<(), ArchiveError> {
        Ok(job_runs::record_outcome(&self.db, job_name, outcome.as_ref().map(|_| ()).map_err(String::as_str)).await?)
    }
}
