//! War snapshots as returned by the upstream game API, and the archived
//! form they are turned into once a war has ended.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream war state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum WarState {
    #[default]
    NotInWar,
    Preparation,
    InWar,
    WarEnded,
    /// Any state string this build does not know about; treated like `NotInWar`.
    #[serde(other)]
    Unknown,
}

/// One attack as reported inside a war member entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarAttack {
    pub attacker_tag: String,
    pub defender_tag: String,
    pub stars: u32,
    pub destruction_percentage: f64,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarMember {
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub map_position: Option<u32>,
    #[serde(default)]
    pub attacks: Vec<WarAttack>,
}

/// One side of a war. War-log entries carry only the aggregate fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WarClan {
    pub tag: Option<String>,
    pub name: Option<String>,
    pub stars: u32,
    pub destruction_percentage: f64,
    /// Total attacks used, present on war-log entries.
    pub attacks: Option<u32>,
    pub members: Vec<WarMember>,
}

/// Upstream view of a clan's current war.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WarSnapshot {
    pub state: WarState,
    pub team_size: Option<u32>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub clan: WarClan,
    pub opponent: WarClan,
}

impl WarSnapshot {
    pub fn start_time_utc(&self) -> Option<DateTime<Utc>> {
        self.start_time.as_deref().and_then(parse_upstream_time)
    }
}

/// Entry of the public war log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WarLogEntry {
    pub result: Option<String>,
    pub end_time: Option<String>,
    pub team_size: Option<u32>,
    pub clan: WarClan,
    pub opponent: WarClan,
}

impl WarLogEntry {
    /// Only finished regular wars carry a terminal result; league rounds show up with none.
    pub fn has_terminal_result(&self) -> bool {
        matches!(self.result.as_deref(), Some("win" | "lose" | "tie"))
    }

    /// View the log entry as an ended war so it can go through the archival path.
    pub fn into_snapshot(self) -> WarSnapshot {
        WarSnapshot {
            state: WarState::WarEnded,
            team_size: self.team_size,
            start_time: None,
            end_time: self.end_time,
            clan: self.clan,
            opponent: self.opponent,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WarLogPage {
    #[serde(default)]
    pub items: Vec<WarLogEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarResult {
    Win,
    Lose,
    Tie,
}

impl WarResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarResult::Win => "win",
            WarResult::Lose => "lose",
            WarResult::Tie => "tie",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "win" => Some(WarResult::Win),
            "lose" => Some(WarResult::Lose),
            "tie" => Some(WarResult::Tie),
            _ => None,
        }
    }
}

/// One attack stored alongside its archived war.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedAttack {
    pub order: u32,
    pub attacker_tag: String,
    pub attacker_name: String,
    pub attacker_map_position: Option<u32>,
    pub defender_tag: String,
    pub defender_map_position: Option<u32>,
    pub stars: u32,
    pub destruction: f64,
    /// Advisory flag derived from map positions, never supplied upstream.
    pub is_violation: bool,
}

/// Durable record of one completed war. `end_time` is the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedWar {
    pub end_time: String,
    pub clan_tag: String,
    pub opponent_name: String,
    pub opponent_tag: Option<String>,
    pub team_size: u32,
    pub clan_stars: u32,
    pub opponent_stars: u32,
    pub clan_destruction: f64,
    pub opponent_destruction: f64,
    pub clan_attacks_used: u32,
    pub result: WarResult,
    pub is_cwl_war: bool,
    pub total_violations: u32,
    /// Sorted by `order`.
    pub attacks: Vec<ArchivedAttack>,
}

/// League-group lookup result.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LeagueGroup {
    #[serde(default)]
    pub state: Option<String>,
}

impl LeagueGroup {
    pub fn is_active(&self) -> bool {
        match self.state.as_deref() {
            None | Some("") | Some("notInWar") => false,
            Some(_) => true,
        }
    }
}

/// Parse the compact upstream timestamp (`20240115T083000.000Z`), falling back to RFC 3339.
pub fn parse_upstream_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S%.fZ")
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}
