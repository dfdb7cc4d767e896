//! Building-level change detection for tracked players.
//!
//! Every tick walks the active trackers one at a time. A tracker whose
//! entitlement lapsed is deactivated without touching upstream; otherwise
//! the player is fetched, flattened into a [`BuildingMap`] and compared to
//! the stored snapshot. Only level increases (and newly seen keys) are
//! announced, but any difference replaces the snapshot.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{ArchiveError, PipelineError};
use crate::models::event::{ChangeEvent, RecipientId};
use crate::models::player::{BuildingMap, BuildingSnapshot, BuildingUpgrade, BuildingValue, PlayerSnapshot};
use crate::models::tag::validate_tag;
use crate::models::tracker::Tracker;
use crate::services::archive::ArchiveGateway;
use crate::services::coc_api::{cancellable, UpstreamApi};
use crate::services::job_runs::jobs;
use crate::services::notifier::Notifier;

pub const TOWN_HALL_KEY: &str = "Town Hall";
pub const WALLS_KEY: &str = "Walls";
pub const BUILDER_HALL_KEY: &str = "[BB] Builder Hall";
pub const BUILDER_LEAGUE_KEY: &str = "[BB] League";

const WALL_ACHIEVEMENT: &str = "Wall Buster";
const UNRANKED_LEAGUE: &str = "Unranked";
const BUILDER_BASE_PREFIX: &str = "[BB] ";

/// Flattens a player payload into building key -> level.
///
/// Categories that could share a name (a hero-equipment piece and a troop,
/// a home and a builder-base troop) get distinct suffixes or prefixes.
pub fn flatten_player(player: &PlayerSnapshot) -> BuildingMap {
    let mut map = BuildingMap::new();

    if let Some(level) = player.town_hall_level {
        map.insert(TOWN_HALL_KEY.to_string(), level.into());
    }

    for hero in &player.heroes {
        map.insert(hero.name.clone(), hero.level.into());
    }

    for equipment in &player.hero_equipment {
        map.insert(format!("{} (equipment)", equipment.name), equipment.level.into());
    }

    for troop in &player.troops {
        let key = if troop.is_builder_base() {
            format!("{}{} (troop)", BUILDER_BASE_PREFIX, troop.name)
        } else {
            format!("{} (troop)", troop.name)
        };
        map.insert(key, troop.level.into());
    }

    for spell in &player.spells {
        map.insert(format!("{} (spell)", spell.name), spell.level.into());
    }

    // Walls have no level field; the achievement counter is the closest proxy
    if let Some(walls) = player.achievements.iter().find(|a| a.name == WALL_ACHIEVEMENT) {
        map.insert(WALLS_KEY.to_string(), walls.value.into());
    }

    if let Some(level) = player.builder_hall_level {
        map.insert(BUILDER_HALL_KEY.to_string(), level.into());
    }

    if let Some(league) = &player.builder_base_league {
        if league.name != UNRANKED_LEAGUE {
            map.insert(BUILDER_LEAGUE_KEY.to_string(), league.name.as_str().into());
        }
    }

    map
}

/// Result of comparing two building maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildingDiff {
    pub upgrades: Vec<BuildingUpgrade>,
    /// Keys whose level went down. Never announced.
    pub decreased: Vec<String>,
    /// Categorical keys (league names) whose value changed.
    pub relabeled: Vec<String>,
    /// Whether the maps differ at all, including removed keys.
    pub changed: bool,
}

/// Monotonic diff: increases and new keys are upgrades, everything else is silent.
pub fn diff_buildings(previous: &BuildingMap, current: &BuildingMap) -> BuildingDiff {
    let mut diff = BuildingDiff {
        changed: previous != current,
        ..Default::default()
    };

    for (key, value) in current {
        match (previous.get(key), value) {
            (None, BuildingValue::Level(new_level)) => {
                if *new_level > 0 {
                    diff.upgrades.push(BuildingUpgrade {
                        key: key.clone(),
                        old_level: 0,
                        new_level: *new_level,
                    });
                }
            }
            (Some(BuildingValue::Level(old_level)), BuildingValue::Level(new_level)) => {
                if new_level > old_level {
                    diff.upgrades.push(BuildingUpgrade {
                        key: key.clone(),
                        old_level: *old_level,
                        new_level: *new_level,
                    });
                } else if new_level < old_level {
                    diff.decreased.push(key.clone());
                }
            }
            (Some(old), new) if old != new => diff.relabeled.push(key.clone()),
            (None, BuildingValue::Label(_)) => diff.relabeled.push(key.clone()),
            _ => {}
        }
    }

    diff
}

/// What happened to one tracker during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerOutcome {
    /// Entitlement lapsed; the tracker was switched off and nothing was fetched.
    Deactivated,
    PlayerNotFound,
    /// No prior snapshot existed; the current map was stored as the baseline.
    Baseline,
    Unchanged,
    Changed { upgrades: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub checked: usize,
    pub deactivated: usize,
    pub upgrades: usize,
    pub failures: usize,
}

/// Result of an opt-in request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Activated(Tracker),
    NotEntitled,
    InvalidTag(String),
}

pub struct BuildingMonitor {
    api: Arc<dyn UpstreamApi>,
    archive: Arc<dyn ArchiveGateway>,
    notifier: Arc<dyn Notifier>,
}

impl BuildingMonitor {
    pub fn new(
        api: Arc<dyn UpstreamApi>,
        archive: Arc<dyn ArchiveGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { api, archive, notifier }
    }

    /// Processes every active tracker. Only failing to list trackers fails the tick.
    /// A pass interrupted by shutdown is not recorded in the job audit.
    pub async fn run_tick(&self, cancel: &CancellationToken) -> Result<MonitorReport, PipelineError> {
        let trackers = match self.archive.list_active_trackers().await {
            Ok(trackers) => trackers,
            Err(e) => {
                self.record_job(Err(e.to_string())).await;
                return Err(e.into());
            }
        };

        let mut report = MonitorReport::default();

        for tracker in &trackers {
            if cancel.is_cancelled() {
                tracing::info!("Building monitor cancelled after {} trackers", report.checked);
                break;
            }

            match self.check_tracker(tracker, cancel).await {
                Err(e) if e.is_cancelled() => break,
                Ok(TrackerOutcome::Deactivated) => report.deactivated += 1,
                Ok(TrackerOutcome::Changed { upgrades }) => report.upgrades += upgrades,
                Ok(_) => {}
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(
                        "Tracker {} ({}) failed: {}",
                        tracker.id,
                        tracker.player_tag,
                        e
                    );
                }
            }
            report.checked += 1;
        }

        tracing::debug!(
            "Building monitor tick: {} checked, {} upgrades, {} deactivated, {} failed",
            report.checked,
            report.upgrades,
            report.deactivated,
            report.failures
        );

        if !cancel.is_cancelled() {
            self.record_job(Ok(())).await;
        }

        Ok(report)
    }

    async fn record_job(&self, outcome: Result<(), String>) {
        if let Err(e) = self
            .archive
            .record_job_result(jobs::BUILDING_MONITOR, outcome)
            .await
        {
            tracing::warn!("[{}] Failed to record job status: {}", jobs::BUILDING_MONITOR, e);
        }
    }

    pub async fn check_tracker(
        &self,
        tracker: &Tracker,
        cancel: &CancellationToken,
    ) -> Result<TrackerOutcome, PipelineError> {
        if !self.archive.is_entitlement_active(tracker.telegram_id).await? {
            self.archive.deactivate_tracker(tracker.id).await?;
            tracing::info!(
                "Entitlement of {} lapsed, stopped tracking {}",
                tracker.telegram_id,
                tracker.player_tag
            );
            return Ok(TrackerOutcome::Deactivated);
        }

        let player = match cancellable(cancel, self.api.fetch_player(&tracker.player_tag)).await {
            Ok(player) => player,
            Err(e) if e.is_not_found() => {
                tracing::warn!("Player {} not found upstream", tracker.player_tag);
                return Ok(TrackerOutcome::PlayerNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let current = flatten_player(&player);
        let snapshot = BuildingSnapshot {
            player_tag: tracker.player_tag.clone(),
            buildings: current,
            captured_at: now,
        };

        let outcome = match self.archive.latest_building_snapshot(&tracker.player_tag).await? {
            None => {
                self.archive.save_building_snapshot(&snapshot).await?;
                tracing::info!(
                    "Stored baseline of {} keys for {}",
                    snapshot.buildings.len(),
                    tracker.player_tag
                );
                TrackerOutcome::Baseline
            }
            Some(previous) => {
                let diff = diff_buildings(&previous.buildings, &snapshot.buildings);
                if !diff.decreased.is_empty() {
                    tracing::debug!(
                        "Ignoring level decreases for {}: {:?}",
                        tracker.player_tag,
                        diff.decreased
                    );
                }

                if diff.changed {
                    self.archive.save_building_snapshot(&snapshot).await?;
                    let count = diff.upgrades.len();
                    if count > 0 {
                        self.announce(tracker, diff.upgrades).await;
                    }
                    TrackerOutcome::Changed { upgrades: count }
                } else {
                    TrackerOutcome::Unchanged
                }
            }
        };

        self.archive.touch_tracker(tracker.id, now).await?;
        Ok(outcome)
    }

    async fn announce(&self, tracker: &Tracker, upgrades: Vec<BuildingUpgrade>) {
        let count = upgrades.len();
        let event = ChangeEvent::BuildingUpgraded {
            player_tag: tracker.player_tag.clone(),
            upgrades,
        };

        match self.notifier.notify(&[tracker.telegram_id], &event).await {
            Ok(()) => tracing::info!(
                "Announced {} upgrade(s) of {} to {}",
                count,
                tracker.player_tag,
                tracker.telegram_id
            ),
            Err(e) => tracing::warn!(
                "Failed to announce upgrades of {}: {}",
                tracker.player_tag,
                e
            ),
        }
    }

    /// Opts a recipient into tracking a player. Requires an active entitlement.
    pub async fn activate_tracking(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<Activation, ArchiveError> {
        let player_tag = match validate_tag(player_tag) {
            Ok(tag) => tag,
            Err(reason) => return Ok(Activation::InvalidTag(reason)),
        };

        if !self.archive.is_entitlement_active(telegram_id).await? {
            return Ok(Activation::NotEntitled);
        }

        let tracker = self.archive.save_tracker(telegram_id, &player_tag).await?;
        tracing::info!("{} started tracking {}", telegram_id, player_tag);
        Ok(Activation::Activated(tracker))
    }

    /// Returns whether an active tracker was switched off.
    pub async fn deactivate_tracking(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<bool, ArchiveError> {
        let Ok(player_tag) = validate_tag(player_tag) else {
            return Ok(false);
        };

        match self.archive.find_tracker(telegram_id, &player_tag).await? {
            Some(tracker) if tracker.is_active => {
                self.archive.deactivate_tracker(tracker.id).await?;
                tracing::info!("{} stopped tracking {}", telegram_id, player_tag);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn is_tracking_active(
        &self,
        telegram_id: RecipientId,
        player_tag: &str,
    ) -> Result<bool, ArchiveError> {
        let Ok(player_tag) = validate_tag(player_tag) else {
            return Ok(false);
        };
        Ok(self
            .archive
            .find_tracker(telegram_id, &player_tag)
            .await?
            .is_some_and(|tracker| tracker.is_active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::player::{Achievement, League, PlayerUnit};

    fn unit(name: &str, level: i64, village: &str) -> PlayerUnit {
        PlayerUnit {
            name: name.to_string(),
            level,
            village: Some(village.to_string()),
        }
    }

    fn map(entries: &[(&str, i64)]) -> BuildingMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), BuildingValue::Level(*v)))
            .collect()
    }

    #[test]
    fn test_flatten_player_keys() {
        let player = PlayerSnapshot {
            tag: "#P".to_string(),
            name: "bob".to_string(),
            town_hall_level: Some(14),
            builder_hall_level: Some(9),
            heroes: vec![unit("Barbarian King", 80, "home")],
            hero_equipment: vec![unit("Giant Gauntlet", 15, "home")],
            troops: vec![unit("Barbarian", 11, "home"), unit("Barbarian", 18, "builderBase")],
            spells: vec![unit("Rage Spell", 6, "home")],
            achievements: vec![Achievement {
                name: "Wall Buster".to_string(),
                value: 2543,
            }],
            builder_base_league: Some(League {
                name: "Copper League V".to_string(),
            }),
        };

        let flat = flatten_player(&player);
        assert_eq!(flat.get(TOWN_HALL_KEY), Some(&BuildingValue::Level(14)));
        assert_eq!(flat.get("Barbarian King"), Some(&BuildingValue::Level(80)));
        assert_eq!(flat.get("Giant Gauntlet (equipment)"), Some(&BuildingValue::Level(15)));
        assert_eq!(flat.get("Barbarian (troop)"), Some(&BuildingValue::Level(11)));
        assert_eq!(flat.get("[BB] Barbarian (troop)"), Some(&BuildingValue::Level(18)));
        assert_eq!(flat.get("Rage Spell (spell)"), Some(&BuildingValue::Level(6)));
        assert_eq!(flat.get(WALLS_KEY), Some(&BuildingValue::Level(2543)));
        assert_eq!(flat.get(BUILDER_HALL_KEY), Some(&BuildingValue::Level(9)));
        assert_eq!(
            flat.get(BUILDER_LEAGUE_KEY),
            Some(&BuildingValue::Label("Copper League V".to_string()))
        );
    }

    #[test]
    fn test_unranked_league_is_skipped() {
        let player = PlayerSnapshot {
            builder_base_league: Some(League {
                name: "Unranked".to_string(),
            }),
            ..Default::default()
        };
        assert!(flatten_player(&player).is_empty());
    }

    #[test]
    fn test_diff_reports_increases_and_new_keys() {
        let old = map(&[("Barbarian King", 30)]);
        let new = map(&[("Barbarian King", 40), ("Archer Queen", 1)]);

        let diff = diff_buildings(&old, &new);
        assert!(diff.changed);
        assert_eq!(diff.upgrades.len(), 2);
        assert!(diff.upgrades.contains(&BuildingUpgrade {
            key: "Barbarian King".to_string(),
            old_level: 30,
            new_level: 40,
        }));
        assert!(diff.upgrades.contains(&BuildingUpgrade {
            key: "Archer Queen".to_string(),
            old_level: 0,
            new_level: 1,
        }));
    }

    #[test]
    fn test_diff_identical_maps() {
        let old = map(&[("Barbarian King", 30)]);
        let diff = diff_buildings(&old, &old.clone());
        assert!(!diff.changed);
        assert!(diff.upgrades.is_empty());
    }

    #[test]
    fn test_diff_ignores_decreases() {
        let old = map(&[("Barbarian King", 40)]);
        let new = map(&[("Barbarian King", 35)]);
        let diff = diff_buildings(&old, &new);
        assert!(diff.changed);
        assert!(diff.upgrades.is_empty());
        assert_eq!(diff.decreased, vec!["Barbarian King".to_string()]);
    }

    #[test]
    fn test_diff_league_change_is_not_an_upgrade() {
        let mut old = BuildingMap::new();
        old.insert(BUILDER_LEAGUE_KEY.to_string(), "Copper League V".into());
        let mut new = BuildingMap::new();
        new.insert(BUILDER_LEAGUE_KEY.to_string(), "Copper League IV".into());

        let diff = diff_buildings(&old, &new);
        assert!(diff.changed);
        assert!(diff.upgrades.is_empty());
        assert_eq!(diff.relabeled, vec![BUILDER_LEAGUE_KEY.to_string()]);
    }
}
