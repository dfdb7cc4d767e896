//! `SeaORM` Entity for war_attacks table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "war_attacks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub war_end_time: String,
    pub attack_order: i32,
    pub attacker_tag: String,
    pub attacker_name: String,
    pub attacker_map_position: Option<i32>,
    pub defender_tag: String,
    pub defender_map_position: Option<i32>,
    pub stars: i32,
    #[sea_orm(column_type = "Double")]
    pub destruction: f64,
    pub is_violation: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::wars::Entity",
        from = "Column::WarEndTime",
        to = "super::wars::Column::EndTime",
        on_delete = "Cascade"
    )]
    Wars,
}

impl Related<super::wars::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wars.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
