//! `SeaORM` Entity for player_stats_snapshots table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "player_stats_snapshots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub snapshot_time: DateTimeUtc,
    #[sea_orm(primary_key, auto_increment = false)]
    pub player_tag: String,
    pub clan_tag: String,
    pub donations: i32,
    pub donations_received: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
