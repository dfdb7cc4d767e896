#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use clanwatch_backend::error::{ArchiveError, FetchError, NotifyError};
use clanwatch_backend::models::event::{ChangeEvent, Dispatch, RecipientId};
use clanwatch_backend::models::player::{BuildingSnapshot, PlayerSnapshot, PlayerUnit};
use clanwatch_backend::models::tracker::{ClanMember, Tracker};
use clanwatch_backend::models::war::{
    ArchivedWar, WarAttack, WarClan, WarLogEntry, WarMember, WarSnapshot, WarState,
};
use clanwatch_backend::services::archive::ArchiveGateway;
use clanwatch_backend::services::coc_api::UpstreamApi;
use clanwatch_backend::services::notifier::Notifier;

pub const CLAN_TAG: &str = "#2PPYQ0VU";

/// Set up test database connection
/// Uses TEST_DATABASE_URL environment variable or falls back to in-memory SQLite
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let database_url = env::var("TEST_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

    // A single connection keeps every query on the same in-memory database
    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Upstream time format, e.g. `20240115T083000.000Z`.
pub fn upstream_time(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S.000Z").to_string()
}

// ---------------------------------------------------------------------------
// Upstream fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeUpstream {
    /// `None` answers NotFound.
    pub current_war: Mutex<Option<WarSnapshot>>,
    pub fail_current_war: AtomicBool,
    pub war_log: Mutex<Vec<WarLogEntry>>,
    pub league_active: AtomicBool,
    pub fail_league: AtomicBool,
    pub players: Mutex<HashMap<String, PlayerSnapshot>>,
    pub failing_players: Mutex<HashSet<String>>,
    pub members: Mutex<Vec<ClanMember>>,
    pub war_fetches: AtomicUsize,
    pub player_fetches: AtomicUsize,
    pub member_fetches: AtomicUsize,
}

impl FakeUpstream {
    pub fn set_war(&self, war: WarSnapshot) {
        *self.current_war.lock() = Some(war);
    }

    pub fn set_player(&self, player: PlayerSnapshot) {
        self.players.lock().insert(player.tag.clone(), player);
    }

    pub fn player_fetches(&self) -> usize {
        self.player_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamApi for FakeUpstream {
    async fn fetch_current_war(&self, clan_tag: &str) -> Result<WarSnapshot, FetchError> {
        self.war_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_current_war.load(Ordering::SeqCst) {
            return Err(FetchError::Transient("upstream unavailable".into()));
        }
        self.current_war
            .lock()
            .clone()
            .ok_or_else(|| FetchError::NotFound(clan_tag.to_string()))
    }

    async fn fetch_war_log(&self, _clan_tag: &str) -> Result<Vec<WarLogEntry>, FetchError> {
        Ok(self.war_log.lock().clone())
    }

    async fn fetch_league_group(&self, clan_tag: &str) -> Result<bool, FetchError> {
        if self.fail_league.load(Ordering::SeqCst) {
            return Err(FetchError::NotFound(clan_tag.to_string()));
        }
        Ok(self.league_active.load(Ordering::SeqCst))
    }

    async fn fetch_player(&self, player_tag: &str) -> Result<PlayerSnapshot, FetchError> {
        self.player_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_players.lock().contains(player_tag) {
            return Err(FetchError::Timeout(player_tag.to_string()));
        }
        self.players
            .lock()
            .get(player_tag)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(player_tag.to_string()))
    }

    async fn fetch_clan_members(&self, _clan_tag: &str) -> Result<Vec<ClanMember>, FetchError> {
        self.member_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.members.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// Archive fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryArchive {
    pub wars: Mutex<BTreeMap<String, ArchivedWar>>,
    pub war_saves: AtomicUsize,
    pub fail_war_saves: AtomicBool,
    pub snapshots: Mutex<HashMap<String, BuildingSnapshot>>,
    pub trackers: Mutex<Vec<Tracker>>,
    pub subscribers: Mutex<Vec<RecipientId>>,
    pub entitled: Mutex<HashSet<RecipientId>>,
    pub donations: Mutex<Vec<(String, ClanMember)>>,
    pub last_success: Mutex<HashMap<String, DateTime<Utc>>>,
    pub job_results: Mutex<Vec<(String, Result<(), String>)>>,
}

impl MemoryArchive {
    pub fn add_tracker(&self, telegram_id: RecipientId, player_tag: &str) -> Tracker {
        let mut trackers = self.trackers.lock();
        let tracker = Tracker {
            id: trackers.len() as i32 + 1,
            telegram_id,
            player_tag: player_tag.to_string(),
            is_active: true,
            created_at: Utc::now(),
            last_checked_at: None,
        };
        trackers.push(tracker.clone());
        tracker
    }

    pub fn tracker(&self, id: i32) -> Option<Tracker> {
        self.trackers.lock().iter().find(|t| t.id == id).cloned()
    }

    pub fn war_saves(&self) -> usize {
        self.war_saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveGateway for MemoryArchive {
    async fn war_exists(&self, end_time: &str) -> Result<bool, ArchiveError> {
        Ok(self.wars.lock().contains_key(end_time))
    }

    async fn save_war(&self, war: &ArchivedWar) -> Result<(), ArchiveError> {
        if self.fail_war_saves.load(Ordering::SeqCst) {
            return Err(ArchiveError::Database(DbErr::Custom("disk full".into())));
        }
        self.war_saves.fetch_add(1, Ordering::SeqCst);
        self.wars.lock().insert(war.end_time.clone(), war.clone());
        Ok(())
    }

    async fn latest_building_snapshot(
        &self,
        player_tag: &str,
    ) -> Result<Option<BuildingSnapshot>, ArchiveError> {
        Ok(self.snapshots.lock().get(player_tag).cloned())
    }

    async fn save_building_snapshot(&self, snapshot: &BuildingSnapshot) -> Result<(), ArchiveError> {
        self.snapshots
            .lock()
            .insert(snapshot.player_tag.clone(), snapshot.clone());
        Ok(())
    }

    async fn list_active_trackers(&self) -> Result<Vec<Tracker>, ArchiveError> {
        Ok(self
            .trackers
            .lock()
            .iter()
            .filter(|t| t.is_active)
            .cloned()
            .collect())
    }

    async fn find_tracker(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<Option<Tracker>, ArchiveError> {
        Ok(self
            .trackers
            .lock()
            .iter()
            .find(|t| t.telegram_id == telegram_id && t.player_tag == player_tag)
            .cloned())
    }

    async fn save_tracker(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<Tracker, ArchiveError> {
        {
            let mut trackers = self.trackers.lock();
            if let Some(existing) = trackers
                .iter_mut()
                .find(|t| t.telegram_id == telegram_id && t.player_tag == player_tag)
            {
                existing.is_active = true;
                return Ok(existing.clone());
            }
        }
        Ok(self.add_tracker(telegram_id, player_tag))
    }

    async fn deactivate_tracker(&self, tracker_id: i32) -> Result<(), ArchiveError> {
        if let Some(t) = self.trackers.lock().iter_mut().find(|t| t.id == tracker_id) {
            t.is_active = false;
        }
        Ok(())
    }

    async fn touch_tracker(&self, tracker_id: i32, checked_at: DateTime<Utc>) -> Result<(), ArchiveError> {
        if let Some(t) = self.trackers.lock().iter_mut().find(|t| t.id == tracker_id) {
            t.last_checked_at = Some(checked_at);
        }
        Ok(())
    }

    async fn list_active_war_subscribers(&self) -> Result<Vec<RecipientId>, ArchiveError> {
        Ok(self.subscribers.lock().clone())
    }

    async fn is_entitlement_active(&self, telegram_id: RecipientId) -> Result<bool, ArchiveError> {
        Ok(self.entitled.lock().contains(&telegram_id))
    }

    async fn save_donation_snapshot(
        &self,
        clan_tag: &str,
        _taken_at: DateTime<Utc>,
        members: &[ClanMember],
    ) -> Result<(), ArchiveError> {
        let mut donations = self.donations.lock();
        for member in members {
            donations.push((clan_tag.to_string(), member.clone()));
        }
        Ok(())
    }

    async fn should_sync(&self, job_name: &str, min_interval_secs: i64) -> Result<bool, ArchiveError> {
        Ok(match self.last_success.lock().get(job_name) {
            Some(at) => Utc::now() - *at >= Duration::seconds(min_interval_secs),
            None => true,
        })
    }

    async fn record_job_result(&self, job_name: &str, outcome: Result<(), String>) -> Result<(), ArchiveError> {
        if outcome.is_ok() {
            self.last_success.lock().insert(job_name.to_string(), Utc::now());
        }
        self.job_results.lock().push((job_name.to_string(), outcome));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    pub dispatches: Mutex<Vec<Dispatch>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.dispatches.lock().iter().map(|d| d.event.clone()).collect()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.dispatches
            .lock()
            .iter()
            .filter(|d| d.event.kind() == kind)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipients: &[RecipientId], event: &ChangeEvent) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("transport down".into()));
        }
        self.dispatches.lock().push(Dispatch {
            recipients: recipients.to_vec(),
            event: event.clone(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn war_member(tag: &str, position: u32, attacks: Vec<WarAttack>) -> WarMember {
    WarMember {
        tag: tag.to_string(),
        name: format!("member {}", tag),
        map_position: Some(position),
        attacks,
    }
}

pub fn war_attack(attacker: &str, defender: &str, stars: u32, destruction: f64, order: u32) -> WarAttack {
    WarAttack {
        attacker_tag: attacker.to_string(),
        defender_tag: defender.to_string(),
        stars,
        destruction_percentage: destruction,
        order,
    }
}

/// A finished 2v2 war: clan 4 stars / 80%, opponent 3 stars / 70%.
pub fn ended_war(end_time: &str) -> WarSnapshot {
    WarSnapshot {
        state: WarState::WarEnded,
        team_size: Some(2),
        start_time: Some("20240115T083000.000Z".to_string()),
        end_time: Some(end_time.to_string()),
        clan: WarClan {
            tag: Some(CLAN_TAG.to_string()),
            name: Some("Home".to_string()),
            stars: 4,
            destruction_percentage: 80.0,
            attacks: None,
            members: vec![
                war_member(
                    "#A",
                    1,
                    vec![war_attack("#A", "#X", 2, 70.0, 1), war_attack("#A", "#Y", 1, 55.0, 3)],
                ),
                war_member("#B", 2, vec![war_attack("#B", "#X", 1, 40.0, 2)]),
            ],
        },
        opponent: WarClan {
            tag: Some("#RIVAL".to_string()),
            name: Some("Rivals".to_string()),
            stars: 3,
            destruction_percentage: 70.0,
            attacks: None,
            members: vec![war_member("#X", 1, vec![]), war_member("#Y", 2, vec![])],
        },
    }
}

pub fn preparation_war(start_time: &str) -> WarSnapshot {
    WarSnapshot {
        state: WarState::Preparation,
        team_size: Some(2),
        start_time: Some(start_time.to_string()),
        end_time: None,
        clan: WarClan {
            members: vec![war_member("#A", 1, vec![]), war_member("#B", 2, vec![])],
            ..Default::default()
        },
        opponent: WarClan {
            name: Some("Rivals".to_string()),
            members: vec![war_member("#X", 1, vec![]), war_member("#Y", 2, vec![])],
            ..Default::default()
        },
    }
}

pub fn war_log_entry(end_time: &str, result: Option<&str>) -> WarLogEntry {
    WarLogEntry {
        result: result.map(str::to_string),
        end_time: Some(end_time.to_string()),
        team_size: Some(15),
        clan: WarClan {
            stars: 40,
            destruction_percentage: 90.0,
            attacks: Some(28),
            ..Default::default()
        },
        opponent: WarClan {
            name: Some("Log Rivals".to_string()),
            stars: 35,
            destruction_percentage: 85.0,
            ..Default::default()
        },
    }
}

pub fn player(tag: &str, heroes: &[(&str, i64)]) -> PlayerSnapshot {
    PlayerSnapshot {
        tag: tag.to_string(),
        name: format!("player {}", tag),
        heroes: heroes
            .iter()
            .map(|(name, level)| PlayerUnit {
                name: name.to_string(),
                level: *level,
                village: Some("home".to_string()),
            })
            .collect(),
        ..Default::default()
    }
}
