//! `SeaORM` Entity for wars table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wars")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub end_time: String,
    pub clan_tag: String,
    pub opponent_name: String,
    pub opponent_tag: Option<String>,
    pub team_size: i32,
    pub clan_stars: i32,
    pub opponent_stars: i32,
    #[sea_orm(column_type = "Double")]
    pub clan_destruction: f64,
    #[sea_orm(column_type = "Double")]
    pub opponent_destruction: f64,
    pub clan_attacks_used: i32,
    pub result: String,
    pub is_cwl_war: bool,
    pub total_violations: i32,
    pub archived_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::war_attacks::Entity")]
    WarAttacks,
}

impl Related<super::war_attacks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WarAttacks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
