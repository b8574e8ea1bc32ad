//! Create charging_sessions table
//!
//! Partial unique indexes keep at most one open session per charger and per
//! user; closing a session releases both.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChargingSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChargingSessions::SessionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChargingSessions::UserId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::ChargerId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::StationId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::Status).string_len(20).not_null())
                    .col(
                        ColumnDef::new(ChargingSessions::PaymentMethod)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::PaymentStatus)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::ElectricityFeePerKwh)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::ServiceFeePerKwh)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChargingSessions::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(ChargingSessions::TargetMaxEnergyWh).big_integer())
                    .col(ColumnDef::new(ChargingSessions::TargetMaxCost).big_integer())
                    .col(ColumnDef::new(ChargingSessions::TargetSoc).integer())
                    .col(
                        ColumnDef::new(ChargingSessions::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChargingSessions::EndTime).timestamp_with_time_zone())
                    .col(ColumnDef::new(ChargingSessions::StartEnergyLevel).integer())
                    .col(ColumnDef::new(ChargingSessions::EndEnergyLevel).integer())
                    .col(
                        ColumnDef::new(ChargingSessions::ActiveSeconds)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ChargingSessions::ResumedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ChargingSessions::PausedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ChargingSessions::DurationSeconds)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ChargingSessions::LastMeterWh).big_integer())
                    .col(ColumnDef::new(ChargingSessions::CurrentPowerKw).string())
                    .col(ColumnDef::new(ChargingSessions::StateOfCharge).integer())
                    .col(
                        ColumnDef::new(ChargingSessions::LastMeterUpdate)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::EnergyDeliveredWh)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::EnergyEstimated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::TotalCost)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ChargingSessions::StopReason).string())
                    .col(
                        ColumnDef::new(ChargingSessions::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_charging_sessions_user_id")
                    .table(ChargingSessions::Table)
                    .col(ChargingSessions::UserId)
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_charging_sessions_open_charger \
             ON charging_sessions (charger_id) WHERE status IN ('active', 'suspended')",
        )
        .await?;
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_charging_sessions_open_user \
             ON charging_sessions (user_id) WHERE status IN ('active', 'suspended')",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChargingSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ChargingSessions {
    Table,
    SessionId,
    UserId,
    ChargerId,
    StationId,
    Status,
    PaymentMethod,
    PaymentStatus,
    ElectricityFeePerKwh,
    ServiceFeePerKwh,
    Currency,
    TargetMaxEnergyWh,
    TargetMaxCost,
    TargetSoc,
    StartTime,
    EndTime,
    StartEnergyLevel,
    EndEnergyLevel,
    ActiveSeconds,
    ResumedAt,
    PausedAt,
    DurationSeconds,
    LastMeterWh,
    CurrentPowerKw,
    StateOfCharge,
    LastMeterUpdate,
    EnergyDeliveredWh,
    EnergyEstimated,
    TotalCost,
    StopReason,
    Version,
}
