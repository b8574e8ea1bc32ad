//! Rate domain entity

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult};
use crate::shared::money::MAX_FEE_PER_KWH;

/// Price per kWh applied at a station, split into the electricity fee and
/// the operator's service fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub station_id: String,
    pub electricity_fee_per_kwh: Decimal,
    pub service_fee_per_kwh: Decimal,
    /// Currency code (ISO 4217)
    pub currency: String,
}

impl Rate {
    pub fn new(
        station_id: impl Into<String>,
        electricity_fee_per_kwh: Decimal,
        service_fee_per_kwh: Decimal,
        currency: impl Into<String>,
    ) -> DomainResult<Self> {
        let rate = Self {
            station_id: station_id.into(),
            electricity_fee_per_kwh,
            service_fee_per_kwh,
            currency: currency.into(),
        };
        rate.validate()?;
        Ok(rate)
    }

    /// Combined price of one kWh, unrounded.
    pub fn unit_price(&self) -> DomainResult<Decimal> {
        self.electricity_fee_per_kwh
            .checked_add(self.service_fee_per_kwh)
            .ok_or_else(|| {
                DomainError::Validation(format!("unit price for station {} overflows", self.station_id))
            })
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.station_id.trim().is_empty() {
            return Err(DomainError::Validation("rate station_id is required".into()));
        }
        if self.electricity_fee_per_kwh < Decimal::ZERO || self.service_fee_per_kwh < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "rate for station {} has a negative fee",
                self.station_id
            )));
        }
        if self.electricity_fee_per_kwh > MAX_FEE_PER_KWH || self.service_fee_per_kwh > MAX_FEE_PER_KWH {
            return Err(DomainError::Validation(format!(
                "rate for station {} exceeds {} per kWh",
                self.station_id, MAX_FEE_PER_KWH
            )));
        }
        if self.currency.len() != 3 {
            return Err(DomainError::Validation(format!(
                "currency '{}' is not an ISO 4217 code",
                self.currency
            )));
        }
        Ok(())
    }

    /// The same prices re-labelled for another station. Used when a station
    /// without its own row falls back to the default rate.
    pub fn for_station(&self, station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            ..self.clone()
        }
    }
}
