//! SeaORM implementation of SessionRepository

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::debug;

use super::{db_err, is_unique_violation, parse_column, parse_decimal};
use crate::domain::session::SessionRepository;
use crate::domain::{
    ChargingSession, ChargingTargets, DomainError, DomainResult, PaymentMethod, PaymentStatus,
    Rate, SessionStatus,
};
use crate::infrastructure::database::entities::charging_session::{self, Column};
use crate::shared::money::{from_minor_units, kwh_to_wh, to_minor_units, wh_to_kwh};

pub struct SeaOrmSessionRepository {
    db: DatabaseConnection,
}

impl SeaOrmSessionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Work out which claim a failed insert collided with.
    async fn claim_conflict(&self, session: &ChargingSession) -> DomainResult<DomainError> {
        if open_on_charger(&self.db, &session.charger_id).await?.is_some() {
            return Ok(DomainError::ChargerBusy(session.charger_id.clone()));
        }
        Ok(DomainError::UserAlreadyCharging(session.user_id.clone()))
    }
}

// ── Conversion helpers ──────────────────────────────────────────

const OPEN_STATUSES: [&str; 2] = ["active", "suspended"];

pub(super) fn model_to_domain(m: charging_session::Model) -> DomainResult<ChargingSession> {
    let rate = Rate {
        station_id: m.station_id.clone(),
        electricity_fee_per_kwh: parse_decimal(&m.electricity_fee_per_kwh, "electricity_fee_per_kwh")?,
        service_fee_per_kwh: parse_decimal(&m.service_fee_per_kwh, "service_fee_per_kwh")?,
        currency: m.currency,
    };
    let current_power_kw = m
        .current_power_kw
        .as_deref()
        .map(|v| parse_decimal(v, "current_power_kw"))
        .transpose()?;

    Ok(ChargingSession {
        session_id: m.session_id,
        user_id: m.user_id,
        charger_id: m.charger_id,
        station_id: m.station_id,
        status: parse_column(&m.status, "status", SessionStatus::parse)?,
        payment_method: parse_column(&m.payment_method, "payment_method", PaymentMethod::parse)?,
        payment_status: parse_column(&m.payment_status, "payment_status", PaymentStatus::parse)?,
        rate,
        targets: ChargingTargets {
            max_energy_kwh: m.target_max_energy_wh.map(wh_to_kwh),
            max_cost: m.target_max_cost.map(from_minor_units),
            target_soc: m.target_soc.and_then(|v| u8::try_from(v).ok()),
        },
        start_time: m.start_time,
        end_time: m.end_time,
        start_energy_level: m.start_energy_level.and_then(|v| u8::try_from(v).ok()),
        end_energy_level: m.end_energy_level.and_then(|v| u8::try_from(v).ok()),
        active_seconds: m.active_seconds,
        resumed_at: m.resumed_at,
        paused_at: m.paused_at,
        duration_seconds: m.duration_seconds,
        last_meter_kwh: m.last_meter_wh.map(wh_to_kwh),
        current_power_kw,
        state_of_charge: m.state_of_charge.and_then(|v| u8::try_from(v).ok()),
        last_meter_update: m.last_meter_update,
        energy_delivered_kwh: wh_to_kwh(m.energy_delivered_wh),
        energy_estimated: m.energy_estimated,
        total_cost: from_minor_units(m.total_cost),
        stop_reason: m.stop_reason,
        version: m.version,
    })
}

fn to_active_model(s: &ChargingSession) -> DomainResult<charging_session::ActiveModel> {
    Ok(charging_session::ActiveModel {
        session_id: Set(s.session_id.clone()),
        user_id: Set(s.user_id.clone()),
        charger_id: Set(s.charger_id.clone()),
        station_id: Set(s.station_id.clone()),
        status: Set(s.status.as_str().to_string()),
        payment_method: Set(s.payment_method.as_str().to_string()),
        payment_status: Set(s.payment_status.as_str().to_string()),
        electricity_fee_per_kwh: Set(s.rate.electricity_fee_per_kwh.to_string()),
        service_fee_per_kwh: Set(s.rate.service_fee_per_kwh.to_string()),
        currency: Set(s.rate.currency.clone()),
        target_max_energy_wh: Set(s.targets.max_energy_kwh.map(kwh_to_wh).transpose()?),
        target_max_cost: Set(s.targets.max_cost.map(to_minor_units).transpose()?),
        target_soc: Set(s.targets.target_soc.map(i32::from)),
        start_time: Set(s.start_time),
        end_time: Set(s.end_time),
        start_energy_level: Set(s.start_energy_level.map(i32::from)),
        end_energy_level: Set(s.end_energy_level.map(i32::from)),
        active_seconds: Set(s.active_seconds),
        resumed_at: Set(s.resumed_at),
        paused_at: Set(s.paused_at),
        duration_seconds: Set(s.duration_seconds),
        last_meter_wh: Set(s.last_meter_kwh.map(kwh_to_wh).transpose()?),
        current_power_kw: Set(s.current_power_kw.map(|p| p.to_string())),
        state_of_charge: Set(s.state_of_charge.map(i32::from)),
        last_meter_update: Set(s.last_meter_update),
        energy_delivered_wh: Set(kwh_to_wh(s.energy_delivered_kwh)?),
        energy_estimated: Set(s.energy_estimated),
        total_cost: Set(to_minor_units(s.total_cost)?),
        stop_reason: Set(s.stop_reason.clone()),
        version: Set(s.version),
    })
}

async fn open_on_charger<C: ConnectionTrait>(
    conn: &C,
    charger_id: &str,
) -> DomainResult<Option<charging_session::Model>> {
    charging_session::Entity::find()
        .filter(Column::ChargerId.eq(charger_id))
        .filter(Column::Status.is_in(OPEN_STATUSES))
        .one(conn)
        .await
        .map_err(db_err)
}

async fn open_for_user<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
) -> DomainResult<Option<charging_session::Model>> {
    charging_session::Entity::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::Status.is_in(OPEN_STATUSES))
        .one(conn)
        .await
        .map_err(db_err)
}

/// Flag a session paid, bumping its version. No-op when already paid.
pub(super) async fn mark_session_paid<C: ConnectionTrait>(conn: &C, session_id: &str) -> DomainResult<()> {
    charging_session::Entity::update_many()
        .col_expr(Column::PaymentStatus, Expr::value(PaymentStatus::Paid.as_str()))
        .col_expr(Column::Version, Expr::col(Column::Version).add(1))
        .filter(Column::SessionId.eq(session_id))
        .filter(Column::PaymentStatus.ne(PaymentStatus::Paid.as_str()))
        .exec(conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

// ── SessionRepository impl ──────────────────────────────────────

#[async_trait]
impl SessionRepository for SeaOrmSessionRepository {
    async fn insert_open(&self, session: &ChargingSession) -> DomainResult<()> {
        debug!(session_id = %session.session_id, charger_id = %session.charger_id, "Inserting session");
        let model = to_active_model(session)?;

        let txn = self.db.begin().await.map_err(db_err)?;
        if open_on_charger(&txn, &session.charger_id).await?.is_some() {
            return Err(DomainError::ChargerBusy(session.charger_id.clone()));
        }
        if open_for_user(&txn, &session.user_id).await?.is_some() {
            return Err(DomainError::UserAlreadyCharging(session.user_id.clone()));
        }

        match model.insert(&txn).await {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                drop(txn);
                return Err(self.claim_conflict(session).await?);
            }
            Err(e) => return Err(db_err(e)),
        }
        txn.commit().await.map_err(db_err)
    }

    async fn find_by_id(&self, session_id: &str) -> DomainResult<Option<ChargingSession>> {
        charging_session::Entity::find_by_id(session_id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()
    }

    async fn compare_and_swap(
        &self,
        expected_status: SessionStatus,
        expected_version: i64,
        session: &ChargingSession,
    ) -> DomainResult<bool> {
        let result = charging_session::Entity::update_many()
            .set(to_active_model(session)?)
            .filter(Column::SessionId.eq(&session.session_id))
            .filter(Column::Status.eq(expected_status.as_str()))
            .filter(Column::Version.eq(expected_version))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 1 {
            return Ok(true);
        }
        match self.find_by_id(&session.session_id).await? {
            Some(_) => Ok(false),
            None => Err(DomainError::not_found(
                "ChargingSession",
                "session_id",
                &session.session_id,
            )),
        }
    }

    async fn set_payment_status(&self, session_id: &str, status: PaymentStatus) -> DomainResult<()> {
        let result = charging_session::Entity::update_many()
            .col_expr(Column::PaymentStatus, Expr::value(status.as_str()))
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .filter(Column::SessionId.eq(session_id))
            .filter(Column::PaymentStatus.ne(status.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 && self.find_by_id(session_id).await?.is_none() {
            return Err(DomainError::not_found("ChargingSession", "session_id", session_id));
        }
        Ok(())
    }

    async fn find_open_for_user(&self, user_id: &str) -> DomainResult<Option<ChargingSession>> {
        open_for_user(&self.db, user_id)
            .await?
            .map(model_to_domain)
            .transpose()
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<ChargingSession>> {
        charging_session::Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::StartTime)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }
}
