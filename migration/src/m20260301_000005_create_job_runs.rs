use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Keyed by job name, e.g. "war_archiver:#2PPYQ0VU" or "building_monitor"
        manager
            .create_table(
                Table::create()
                    .table(JobRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JobRuns::JobName).string_len(120).not_null().primary_key())
                    .col(ColumnDef::new(JobRuns::LastAttemptAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(JobRuns::LastSuccessAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(JobRuns::LastError).text().null())
                    .col(ColumnDef::new(JobRuns::SuccessCount).big_integer().not_null().default(0))
                    .col(ColumnDef::new(JobRuns::FailureCount).big_integer().not_null().default(0))
                    .col(ColumnDef::new(JobRuns::ConsecutiveFailures).integer().not_null().default(0))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum JobRuns {
    Table,
    JobName,
    LastAttemptAt,
    LastSuccessAt,
    LastError,
    SuccessCount,
    FailureCount,
    ConsecutiveFailures,
}
