use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlayerStatsSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlayerStatsSnapshots::SnapshotTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PlayerStatsSnapshots::PlayerTag).string_len(16).not_null())
                    .col(ColumnDef::new(PlayerStatsSnapshots::ClanTag).string_len(16).not_null())
                    .col(ColumnDef::new(PlayerStatsSnapshots::Donations).integer().not_null())
                    .col(
                        ColumnDef::new(PlayerStatsSnapshots::DonationsReceived)
                            .integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(PlayerStatsSnapshots::SnapshotTime)
                            .col(PlayerStatsSnapshots::PlayerTag),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlayerStatsSnapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PlayerStatsSnapshots {
    Table,
    SnapshotTime,
    PlayerTag,
    ClanTag,
    Donations,
    DonationsReceived,
}
