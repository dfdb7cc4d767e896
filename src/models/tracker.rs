use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::RecipientId;

/// "Watch `player_tag` for `telegram_id`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    pub id: i32,
    pub telegram_id: RecipientId,
    pub player_tag: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Donation counters of one clan member, snapshotted periodically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMember {
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub donations: i32,
    #[serde(default)]
    pub donations_received: i32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ClanDetails {
    pub tag: String,
    pub name: String,
    pub member_list: Vec<ClanMember>,
}
