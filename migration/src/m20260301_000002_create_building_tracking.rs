use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Latest known building map per player, replaced wholesale on change
        manager
            .create_table(
                Table::create()
                    .table(BuildingSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BuildingSnapshots::PlayerTag)
                            .string_len(16)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BuildingSnapshots::Buildings).json().not_null())
                    .col(
                        ColumnDef::new(BuildingSnapshots::CapturedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BuildingTrackers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BuildingTrackers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BuildingTrackers::TelegramId).big_integer().not_null())
                    .col(ColumnDef::new(BuildingTrackers::PlayerTag).string_len(16).not_null())
                    .col(
                        ColumnDef::new(BuildingTrackers::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(BuildingTrackers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BuildingTrackers::LastCheckedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_building_trackers_owner_player")
                    .table(BuildingTrackers::Table)
                    .col(BuildingTrackers::TelegramId)
                    .col(BuildingTrackers::PlayerTag)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BuildingTrackers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BuildingSnapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BuildingSnapshots {
    Table,
    PlayerTag,
    Buildings,
    CapturedAt,
}

#[derive(DeriveIden)]
enum BuildingTrackers {
    Table,
    Id,
    TelegramId,
    PlayerTag,
    IsActive,
    CreatedAt,
    LastCheckedAt,
}
