use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per completed war, keyed by the upstream end time
        manager
            .create_table(
                Table::create()
                    .table(Wars::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Wars::EndTime)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Wars::ClanTag).string_len(16).not_null())
                    .col(ColumnDef::new(Wars::OpponentName).string().not_null())
                    .col(ColumnDef::new(Wars::OpponentTag).string_len(16).null())
                    .col(ColumnDef::new(Wars::TeamSize).integer().not_null())
                    .col(ColumnDef::new(Wars::ClanStars).integer().not_null())
                    .col(ColumnDef::new(Wars::OpponentStars).integer().not_null())
                    .col(ColumnDef::new(Wars::ClanDestruction).double().not_null())
                    .col(ColumnDef::new(Wars::OpponentDestruction).double().not_null())
                    .col(ColumnDef::new(Wars::ClanAttacksUsed).integer().not_null())
                    .col(ColumnDef::new(Wars::Result).string_len(8).not_null())
                    .col(
                        ColumnDef::new(Wars::IsCwlWar)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Wars::TotalViolations)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Wars::ArchivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WarAttacks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WarAttacks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WarAttacks::WarEndTime).string_len(32).not_null())
                    .col(ColumnDef::new(WarAttacks::AttackOrder).integer().not_null())
                    .col(ColumnDef::new(WarAttacks::AttackerTag).string_len(16).not_null())
                    .col(ColumnDef::new(WarAttacks::AttackerName).string().not_null())
                    .col(ColumnDef::new(WarAttacks::AttackerMapPosition).integer().null())
                    .col(ColumnDef::new(WarAttacks::DefenderTag).string_len(16).not_null())
                    .col(ColumnDef::new(WarAttacks::DefenderMapPosition).integer().null())
                    .col(ColumnDef::new(WarAttacks::Stars).integer().not_null())
                    .col(ColumnDef::new(WarAttacks::Destruction).double().not_null())
                    .col(
                        ColumnDef::new(WarAttacks::IsViolation)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_war_attacks_war_end_time")
                            .from(WarAttacks::Table, WarAttacks::WarEndTime)
                            .to(Wars::Table, Wars::EndTime)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Upstream attack order is unique inside a war
        manager
            .create_index(
                Index::create()
                    .name("idx_war_attacks_unique_order")
                    .table(WarAttacks::Table)
                    .col(WarAttacks::WarEndTime)
                    .col(WarAttacks::AttackOrder)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WarAttacks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Wars::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Wars {
    Table,
    EndTime,
    ClanTag,
    OpponentName,
    OpponentTag,
    TeamSize,
    ClanStars,
    OpponentStars,
    ClanDestruction,
    OpponentDestruction,
    ClanAttacksUsed,
    Result,
    IsCwlWar,
    TotalViolations,
    ArchivedAt,
}

#[derive(DeriveIden)]
enum WarAttacks {
    Table,
    Id,
    WarEndTime,
    AttackOrder,
    AttackerTag,
    AttackerName,
    AttackerMapPosition,
    DefenderTag,
    DefenderMapPosition,
    Stars,
    Destruction,
    IsViolation,
}
