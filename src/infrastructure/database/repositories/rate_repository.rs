//! SeaORM implementation of RateRepository

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, Set};
use tracing::debug;

use super::{db_err, parse_decimal};
use crate::domain::rate::RateRepository;
use crate::domain::{DomainResult, Rate};
use crate::infrastructure::database::entities::rate::{self, Column};

pub struct SeaOrmRateRepository {
    db: DatabaseConnection,
}

impl SeaOrmRateRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: rate::Model) -> DomainResult<Rate> {
    Ok(Rate {
        station_id: m.station_id,
        electricity_fee_per_kwh: parse_decimal(&m.electricity_fee_per_kwh, "electricity_fee_per_kwh")?,
        service_fee_per_kwh: parse_decimal(&m.service_fee_per_kwh, "service_fee_per_kwh")?,
        currency: m.currency,
    })
}

#[async_trait]
impl RateRepository for SeaOrmRateRepository {
    async fn find_by_station(&self, station_id: &str) -> DomainResult<Option<Rate>> {
        rate::Entity::find_by_id(station_id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()
    }

    async fn upsert(&self, rate: Rate) -> DomainResult<()> {
        debug!(
            station_id = %rate.station_id,
            electricity_fee = %rate.electricity_fee_per_kwh,
            service_fee = %rate.service_fee_per_kwh,
            "Upserting rate"
        );
        let model = rate::ActiveModel {
            station_id: Set(rate.station_id),
            electricity_fee_per_kwh: Set(rate.electricity_fee_per_kwh.to_string()),
            service_fee_per_kwh: Set(rate.service_fee_per_kwh.to_string()),
            currency: Set(rate.currency),
            updated_at: Set(Utc::now()),
        };
        rate::Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::StationId)
                    .update_columns([
                        Column::ElectricityFeePerKwh,
                        Column::ServiceFeePerKwh,
                        Column::Currency,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_all(&self) -> DomainResult<Vec<Rate>> {
        rate::Entity::find()
            .order_by_asc(Column::StationId)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }
}
