//! Charging session entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "charging_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: String,

    pub user_id: String,
    pub charger_id: String,
    pub station_id: String,

    /// active, suspended, completed, faulted
    pub status: String,
    pub payment_method: String,
    /// pending, paid, not_required
    pub payment_status: String,

    // Rate snapshot taken at start
    pub electricity_fee_per_kwh: String,
    pub service_fee_per_kwh: String,
    pub currency: String,

    #[sea_orm(nullable)]
    pub target_max_energy_wh: Option<i64>,
    #[sea_orm(nullable)]
    pub target_max_cost: Option<i64>,
    #[sea_orm(nullable)]
    pub target_soc: Option<i32>,

    pub start_time: DateTimeUtc,
    #[sea_orm(nullable)]
    pub end_time: Option<DateTimeUtc>,
    #[sea_orm(nullable)]
    pub start_energy_level: Option<i32>,
    #[sea_orm(nullable)]
    pub end_energy_level: Option<i32>,

    pub active_seconds: i64,
    #[sea_orm(nullable)]
    pub resumed_at: Option<DateTimeUtc>,
    #[sea_orm(nullable)]
    pub paused_at: Option<DateTimeUtc>,
    pub duration_seconds: i64,

    // Live meter data
    #[sea_orm(nullable)]
    pub last_meter_wh: Option<i64>,
    #[sea_orm(nullable)]
    pub current_power_kw: Option<String>,
    #[sea_orm(nullable)]
    pub state_of_charge: Option<i32>,
    #[sea_orm(nullable)]
    pub last_meter_update: Option<DateTimeUtc>,

    pub energy_delivered_wh: i64,
    pub energy_estimated: bool,
    /// Minor units
    pub total_cost: i64,
    #[sea_orm(nullable)]
    pub stop_reason: Option<String>,

    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
