//! Player snapshots and the flattened building map derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A hero, troop, spell or hero-equipment entry of the player payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUnit {
    pub name: String,
    pub level: i64,
    #[serde(default)]
    pub village: Option<String>,
}

impl PlayerUnit {
    pub fn is_builder_base(&self) -> bool {
        self.village.as_deref() == Some("builderBase")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub name: String,
}

/// Upstream player payload, reduced to what the building monitor diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSnapshot {
    pub tag: String,
    pub name: String,
    pub town_hall_level: Option<i64>,
    pub builder_hall_level: Option<i64>,
    pub heroes: Vec<PlayerUnit>,
    pub hero_equipment: Vec<PlayerUnit>,
    pub troops: Vec<PlayerUnit>,
    pub spells: Vec<PlayerUnit>,
    pub achievements: Vec<Achievement>,
    pub builder_base_league: Option<League>,
}

/// Level of a building key, or a categorical value such as a league name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildingValue {
    Level(i64),
    Label(String),
}

impl BuildingValue {
    pub fn as_level(&self) -> Option<i64> {
        match self {
            BuildingValue::Level(level) => Some(*level),
            BuildingValue::Label(_) => None,
        }
    }
}

impl From<i64> for BuildingValue {
    fn from(level: i64) -> Self {
        BuildingValue::Level(level)
    }
}

impl From<&str> for BuildingValue {
    fn from(label: &str) -> Self {
        BuildingValue::Label(label.to_string())
    }
}

/// Building key -> value. Ordered so diffs and stored JSON are deterministic.
pub type BuildingMap = BTreeMap<String, BuildingValue>;

/// The most recent successful read of a player's buildings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub player_tag: String,
    pub buildings: BuildingMap,
    pub captured_at: DateTime<Utc>,
}

/// A single detected upgrade. `old_level` is 0 for keys seen for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingUpgrade {
    pub key: String,
    pub old_level: i64,
    pub new_level: i64,
}
