//! Create rates table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Rates::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rates::StationId).string().not_null().primary_key())
                    .col(ColumnDef::new(Rates::ElectricityFeePerKwh).string().not_null())
                    .col(ColumnDef::new(Rates::ServiceFeePerKwh).string().not_null())
                    .col(ColumnDef::new(Rates::Currency).string_len(3).not_null())
                    .col(
                        ColumnDef::new(Rates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Rates::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Rates {
    Table,
    StationId,
    ElectricityFeePerKwh,
    ServiceFeePerKwh,
    Currency,
    UpdatedAt,
}
