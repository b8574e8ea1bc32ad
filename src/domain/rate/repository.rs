//! Rate repository interface

use async_trait::async_trait;

use super::model::Rate;
use crate::domain::DomainResult;

#[async_trait]
pub trait RateRepository: Send + Sync {
    async fn find_by_station(&self, station_id: &str) -> DomainResult<Option<Rate>>;
    /// Insert or replace the rate for `rate.station_id`. Used by seeding and
    /// admin tooling; the settlement path only reads.
    async fn upsert(&self, rate: Rate) -> DomainResult<()>;
    async fn find_all(&self) -> DomainResult<Vec<Rate>>;
}
