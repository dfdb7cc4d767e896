//! Structured change events handed to the notification transport.
//!
//! Events never carry rendered text; formatting belongs to the chat layer.

use serde::{Deserialize, Serialize};

use super::player::BuildingUpgrade;
use super::war::WarResult;

/// Chat identifier of a notification recipient.
pub type RecipientId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ChangeEvent {
    /// A war in preparation starts within the notification window.
    WarStarting {
        clan_tag: String,
        start_time: String,
        opponent_name: String,
        clan_team_size: u32,
        opponent_team_size: u32,
    },
    /// A war was archived for the first time.
    WarEnded {
        clan_tag: String,
        end_time: String,
        opponent_name: String,
        result: WarResult,
        clan_stars: u32,
        opponent_stars: u32,
        total_violations: u32,
        is_cwl_war: bool,
    },
    /// One or more levels of a tracked player went up.
    BuildingUpgraded {
        player_tag: String,
        upgrades: Vec<BuildingUpgrade>,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::WarStarting { .. } => "WarStarting",
            ChangeEvent::WarEnded { .. } => "WarEnded",
            ChangeEvent::BuildingUpgraded { .. } => "BuildingUpgraded",
        }
    }
}

/// An event together with the recipients it is addressed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    pub recipients: Vec<RecipientId>,
    pub event: ChangeEvent,
}
