//! `SeaORM` Entity for building_snapshots table
//!
//! `buildings` holds the flattened building key -> level map as JSON.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "building_snapshots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub player_tag: String,
    pub buildings: Json,
    pub captured_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
