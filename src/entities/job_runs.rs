//! `SeaORM` Entity for the per-pipeline run audit

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "job_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub job_name: String,
    pub last_attempt_at: DateTimeUtc,
    pub last_success_at: Option<DateTimeUtc>,
    pub last_error: Option<String>,
    pub success_count: i64,
    pub failure_count: i64,
    /// Reset to zero by every successful run.
    pub consecutive_failures: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
