//! War-cycle change detection for one clan.
//!
//! Each tick reads the current war and reacts to two transitions:
//! a war in preparation that starts within the notice window produces one
//! `WarStarting` event, and an ended war that has not been archived yet is
//! persisted and announced with `WarEnded`. On startup the public war log
//! is swept so wars that ended while the process was down are archived too.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, PipelineError};
use crate::models::event::ChangeEvent;
use crate::models::war::{ArchivedAttack, ArchivedWar, WarResult, WarSnapshot, WarState};
use crate::services::archive::ArchiveGateway;
use crate::services::coc_api::{cancellable, UpstreamApi};
use crate::services::job_runs::{intervals, jobs};
use crate::services::notifier::Notifier;

pub const MAX_ATTACKS_PER_MEMBER: u32 = 2;

pub const UNKNOWN_OPPONENT: &str = "Unknown opponent";

fn preparation_notice_window() -> Duration {
    Duration::hours(1)
}

/// What a single current-war check observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarCheck {
    /// No war, an unknown state, or the clan does not exist upstream.
    Idle,
    Preparation { notified: bool },
    InWar,
    Ended { archived: bool },
}

pub struct WarChangeDetector {
    clan_tag: String,
    api: Arc<dyn UpstreamApi>,
    archive: Arc<dyn ArchiveGateway>,
    notifier: Arc<dyn Notifier>,
    donation_interval_secs: i64,
    /// Start time of the war we already sent a `WarStarting` for.
    notified_start_time: Mutex<Option<String>>,
    /// End time of the last war this detector saw archived.
    last_archived_end_time: Mutex<Option<String>>,
}

impl WarChangeDetector {
    pub fn new(
        clan_tag: impl Into<String>,
        api: Arc<dyn UpstreamApi>,
        archive: Arc<dyn ArchiveGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clan_tag: clan_tag.into(),
            api,
            archive,
            notifier,
            donation_interval_secs: intervals::DONATION_SNAPSHOT,
            notified_start_time: Mutex::new(None),
            last_archived_end_time: Mutex::new(None),
        }
    }

    pub fn with_donation_interval(mut self, secs: i64) -> Self {
        self.donation_interval_secs = secs;
        self
    }

    pub fn clan_tag(&self) -> &str {
        &self.clan_tag
    }

    /// One scheduled pass: current war, donation snapshot if due, job audit.
    ///
    /// A pass cut short by shutdown records nothing.
    pub async fn run_tick(&self, cancel: &CancellationToken) -> Result<WarCheck, PipelineError> {
        let result = self.check_current_war(cancel).await;
        if matches!(&result, Err(e) if e.is_cancelled()) {
            return result;
        }

        let outcome = result.as_ref().map(|_| ()).map_err(|e| e.to_string());
        self.record_job(&jobs::for_clan(jobs::WAR_ARCHIVER, &self.clan_tag), outcome)
            .await;

        if !cancel.is_cancelled() {
            self.snapshot_donations_if_due(cancel).await;
        }

        result
    }

    async fn record_job(&self, job_name: &str, outcome: Result<(), String>) {
        if let Err(e) = self.archive.record_job_result(job_name, outcome).await {
            tracing::warn!("[{}] Failed to record job status: {}", job_name, e);
        }
    }

    pub async fn check_current_war(&self, cancel: &CancellationToken) -> Result<WarCheck, PipelineError> {
        let war = match cancellable(cancel, self.api.fetch_current_war(&self.clan_tag)).await {
            Ok(war) => war,
            Err(FetchError::NotFound(_)) => {
                tracing::warn!("Clan {} not found upstream, nothing to do", self.clan_tag);
                return Ok(WarCheck::Idle);
            }
            Err(e) => return Err(e.into()),
        };

        match war.state {
            WarState::Preparation => {
                let notified = self.check_preparation(&war, Utc::now()).await?;
                Ok(WarCheck::Preparation { notified })
            }
            WarState::InWar => Ok(WarCheck::InWar),
            WarState::WarEnded => {
                let archived = self.check_ended(&war, cancel).await?;
                Ok(WarCheck::Ended { archived })
            }
            WarState::NotInWar | WarState::Unknown => Ok(WarCheck::Idle),
        }
    }

    /// Sends `WarStarting` once per distinct start time, only inside the notice window.
    async fn check_preparation(&self, war: &WarSnapshot, now: DateTime<Utc>) -> Result<bool, PipelineError> {
        let Some(start_raw) = war.start_time.as_deref() else {
            tracing::debug!("War in preparation for {} has no start time", self.clan_tag);
            return Ok(false);
        };

        if self.notified_start_time.lock().as_deref() == Some(start_raw) {
            return Ok(false);
        }

        let Some(start) = war.start_time_utc() else {
            tracing::warn!("Unparseable war start time '{}' for {}", start_raw, self.clan_tag);
            return Ok(false);
        };

        let until_start = start - now;
        if until_start <= Duration::zero() || until_start > preparation_notice_window() {
            return Ok(false);
        }

        let recipients = self.archive.list_active_war_subscribers().await?;
        let event = ChangeEvent::WarStarting {
            clan_tag: self.clan_tag.clone(),
            start_time: start_raw.to_string(),
            opponent_name: opponent_name(war),
            clan_team_size: side_size(war, war.clan.members.len()),
            opponent_team_size: side_size(war, war.opponent.members.len()),
        };

        match self.notifier.notify(&recipients, &event).await {
            Ok(()) => {
                *self.notified_start_time.lock() = Some(start_raw.to_string());
                tracing::info!(
                    "War starting notice sent for {} ({} min left, {} recipients)",
                    self.clan_tag,
                    until_start.num_minutes(),
                    recipients.len()
                );
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Failed to send war starting notice for {}: {}", self.clan_tag, e);
                Ok(false)
            }
        }
    }

    /// Archives an ended war exactly once and announces it.
    async fn check_ended(&self, war: &WarSnapshot, cancel: &CancellationToken) -> Result<bool, PipelineError> {
        let Some(end_time) = war.end_time.as_deref() else {
            tracing::warn!("Ended war for {} has no end time, skipping", self.clan_tag);
            return Ok(false);
        };

        if self.last_archived_end_time.lock().as_deref() == Some(end_time) {
            return Ok(false);
        }

        if self.archive.war_exists(end_time).await? {
            *self.last_archived_end_time.lock() = Some(end_time.to_string());
            return Ok(false);
        }

        let is_cwl_war = self.lookup_cwl(cancel).await;
        let Some(archived) = build_archived_war(&self.clan_tag, war, is_cwl_war) else {
            return Ok(false);
        };

        self.archive.save_war(&archived).await?;
        *self.last_archived_end_time.lock() = Some(end_time.to_string());

        tracing::info!(
            "Archived war {} for {}: {} {}-{} ({} violations)",
            archived.end_time,
            self.clan_tag,
            archived.result.as_str(),
            archived.clan_stars,
            archived.opponent_stars,
            archived.total_violations
        );

        let event = ChangeEvent::WarEnded {
            clan_tag: self.clan_tag.clone(),
            end_time: archived.end_time.clone(),
            opponent_name: archived.opponent_name.clone(),
            result: archived.result,
            clan_stars: archived.clan_stars,
            opponent_stars: archived.opponent_stars,
            total_violations: archived.total_violations,
            is_cwl_war: archived.is_cwl_war,
        };

        match self.archive.list_active_war_subscribers().await {
            Ok(recipients) => {
                if let Err(e) = self.notifier.notify(&recipients, &event).await {
                    tracing::warn!("Failed to announce ended war for {}: {}", self.clan_tag, e);
                }
            }
            Err(e) => tracing::warn!("Could not list war subscribers for {}: {}", self.clan_tag, e),
        }

        Ok(true)
    }

    /// League membership decides `is_cwl_war`. Lookup failures count as "not league".
    async fn lookup_cwl(&self, cancel: &CancellationToken) -> bool {
        match cancellable(cancel, self.api.fetch_league_group(&self.clan_tag)).await {
            Ok(active) => active,
            Err(e) => {
                tracing::debug!("League group lookup for {} failed: {}", self.clan_tag, e);
                false
            }
        }
    }

    /// Archives every ended war in the public log that is missing from the archive.
    ///
    /// Runs silently: no `WarEnded` events are emitted for backfilled wars.
    pub async fn sweep_war_log(&self, cancel: &CancellationToken) -> Result<usize, PipelineError> {
        let job_name = jobs::for_clan(jobs::WAR_LOG_SWEEP, &self.clan_tag);

        let entries = match cancellable(cancel, self.api.fetch_war_log(&self.clan_tag)).await {
            Ok(entries) => entries,
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled.into()),
            Err(e) => {
                self.record_job(&job_name, Err(e.to_string())).await;
                return Err(e.into());
            }
        };

        let mut archived = 0;
        for entry in entries {
            if cancel.is_cancelled() {
                break;
            }
            if !entry.has_terminal_result() {
                continue;
            }
            let Some(end_time) = entry.end_time.clone() else {
                continue;
            };

            match self.archive.war_exists(&end_time).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Exists check for war {} failed: {}", end_time, e);
                    continue;
                }
            }

            let Some(war) = build_archived_war(&self.clan_tag, &entry.into_snapshot(), false) else {
                continue;
            };

            match self.archive.save_war(&war).await {
                Ok(()) => {
                    archived += 1;
                    tracing::info!("Backfilled war {} for {} from war log", end_time, self.clan_tag);
                }
                Err(e) => tracing::warn!("Failed to backfill war {}: {}", end_time, e),
            }
        }

        if cancel.is_cancelled() {
            tracing::info!("War log sweep for {} interrupted after {} wars", self.clan_tag, archived);
            return Ok(archived);
        }
        self.record_job(&job_name, Ok(())).await;

        tracing::info!("War log sweep for {} archived {} missing wars", self.clan_tag, archived);
        Ok(archived)
    }

    /// Stores member donation counters when the durable interval has elapsed.
    /// Failures are logged and never fail the tick.
    pub async fn snapshot_donations_if_due(&self, cancel: &CancellationToken) -> bool {
        let job_name = jobs::for_clan(jobs::DONATION_SNAPSHOT, &self.clan_tag);

        match self.archive.should_sync(&job_name, self.donation_interval_secs).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                tracing::warn!("[{}] Could not read job status: {}", job_name, e);
                return false;
            }
        }

        let result: Result<usize, PipelineError> = async {
            let members = cancellable(cancel, self.api.fetch_clan_members(&self.clan_tag)).await?;
            self.archive
                .save_donation_snapshot(&self.clan_tag, Utc::now(), &members)
                .await?;
            Ok(members.len())
        }
        .await;

        let outcome = match &result {
            Ok(count) => {
                tracing::info!("[{}] Stored donations for {} members", job_name, count);
                Ok(())
            }
            Err(e) if e.is_cancelled() => return false,
            Err(e) => {
                tracing::warn!("[{}] Donation snapshot failed: {}", job_name, e);
                Err(e.to_string())
            }
        };

        self.record_job(&job_name, outcome).await;

        result.is_ok()
    }
}

fn opponent_name(war: &WarSnapshot) -> String {
    war.opponent
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_OPPONENT.to_string())
}

fn side_size(war: &WarSnapshot, member_count: usize) -> u32 {
    if member_count > 0 {
        member_count as u32
    } else {
        war.team_size.unwrap_or(0)
    }
}

/// Stars decide, then destruction; equal on both is a tie.
pub fn determine_result(
    clan_stars: u32,
    opponent_stars: u32,
    clan_destruction: f64,
    opponent_destruction: f64,
) -> WarResult {
    if clan_stars > opponent_stars {
        WarResult::Win
    } else if clan_stars < opponent_stars {
        WarResult::Lose
    } else if clan_destruction > opponent_destruction {
        WarResult::Win
    } else if clan_destruction < opponent_destruction {
        WarResult::Lose
    } else {
        WarResult::Tie
    }
}

/// Builds the archived record of an ended war. `None` when the war has no end time.
pub fn build_archived_war(clan_tag: &str, war: &WarSnapshot, is_cwl_war: bool) -> Option<ArchivedWar> {
    let end_time = war.end_time.clone()?;

    let defender_positions: HashMap<&str, Option<u32>> = war
        .opponent
        .members
        .iter()
        .map(|m| (m.tag.as_str(), m.map_position))
        .collect();

    let mut attacks: Vec<ArchivedAttack> = war
        .clan
        .members
        .iter()
        .flat_map(|member| {
            let defender_positions = &defender_positions;
            member.attacks.iter().map(move |attack| {
                let defender_map_position = defender_positions
                    .get(attack.defender_tag.as_str())
                    .copied()
                    .flatten();
                ArchivedAttack {
                    order: attack.order,
                    attacker_tag: member.tag.clone(),
                    attacker_name: member.name.clone(),
                    attacker_map_position: member.map_position,
                    defender_tag: attack.defender_tag.clone(),
                    defender_map_position,
                    stars: attack.stars,
                    destruction: attack.destruction_percentage,
                    is_violation: is_violation(member.map_position, defender_map_position),
                }
            })
        })
        .collect();
    attacks.sort_by_key(|attack| attack.order);

    let clan_attacks_used = if war.clan.members.is_empty() {
        war.clan.attacks.unwrap_or(0)
    } else {
        attacks.len() as u32
    };

    // Completeness proxy: every attack a member left unused counts once
    let total_violations = war
        .clan
        .members
        .iter()
        .map(|m| MAX_ATTACKS_PER_MEMBER.saturating_sub(m.attacks.len() as u32))
        .sum();

    let team_size = war
        .team_size
        .filter(|size| *size > 0)
        .unwrap_or(war.clan.members.len() as u32);

    Some(ArchivedWar {
        end_time,
        clan_tag: clan_tag.to_string(),
        opponent_name: opponent_name(war),
        opponent_tag: war.opponent.tag.clone(),
        team_size,
        clan_stars: war.clan.stars,
        opponent_stars: war.opponent.stars,
        clan_destruction: war.clan.destruction_percentage,
        opponent_destruction: war.opponent.destruction_percentage,
        clan_attacks_used,
        result: determine_result(
            war.clan.stars,
            war.opponent.stars,
            war.clan.destruction_percentage,
            war.opponent.destruction_percentage,
        ),
        is_cwl_war,
        total_violations,
        attacks,
    })
}

/// Advisory: attacking a base ranked above your own map position.
fn is_violation(attacker_position: Option<u32>, defender_position: Option<u32>) -> bool {
    matches!((defender_position, attacker_position), (Some(def), Some(att)) if def < att)
}
