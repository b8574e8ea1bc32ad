//! Order entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub order_id: String,

    pub user_id: String,
    /// charging, recharge
    pub order_type: String,
    /// Minor units
    pub amount: i64,
    pub payment_method: String,

    #[sea_orm(nullable)]
    pub session_id: Option<String>,

    /// pending, paid, cancelled, refunded
    pub status: String,

    #[sea_orm(nullable)]
    pub external_reference: Option<String>,
    #[sea_orm(nullable)]
    pub cancel_reason: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    #[sea_orm(nullable)]
    pub paid_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::charging_session::Entity",
        from = "Column::SessionId",
        to = "super::charging_session::Column::SessionId"
    )]
    ChargingSession,
}

impl Related<super::charging_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChargingSession.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
