//! Rate table: per-station price lookup with a configured fallback

use std::sync::Arc;

use tracing::info;

use crate::domain::{DomainError, DomainResult, Rate, RepositoryProvider};

pub struct RateTable {
    repos: Arc<dyn RepositoryProvider>,
    default_rate: Option<Rate>,
}

impl RateTable {
    pub fn new(repos: Arc<dyn RepositoryProvider>, default_rate: Option<Rate>) -> Self {
        Self { repos, default_rate }
    }

    /// Station's own rate, else the default re-labelled for the station.
    pub async fn rate_for(&self, station_id: &str) -> DomainResult<Rate> {
        if let Some(rate) = self.repos.rates().find_by_station(station_id).await? {
            return Ok(rate);
        }
        self.default_rate
            .as_ref()
            .map(|rate| rate.for_station(station_id))
            .ok_or_else(|| DomainError::not_found("Rate", "station_id", station_id))
    }

    pub async fn upsert(&self, rate: Rate) -> DomainResult<()> {
        rate.validate()?;
        info!(
            station_id = %rate.station_id,
            electricity_fee = %rate.electricity_fee_per_kwh,
            service_fee = %rate.service_fee_per_kwh,
            "Rate updated"
        );
        self.repos.rates().upsert(rate).await
    }

    pub async fn list(&self) -> DomainResult<Vec<Rate>> {
        self.repos.rates().find_all().await
    }
}
