//! Cost calculator
//!
//! Pure functions over energy and a rate snapshot. Rounding happens once, on
//! the final total.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{DomainResult, EnergyReading, Rate};
use crate::shared::money::{checked_product, round_energy, round_money, MAX_ENERGY_KWH};

pub const DEFAULT_ESTIMATED_POWER_KW: Decimal = Decimal::from_parts(70, 0, 0, false, 1);

/// Itemised cost for display. `total` is rounded from the unrounded sum, so
/// it may differ from `electricity_cost + service_cost` by one minor unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub energy_kwh: Decimal,
    pub energy_estimated: bool,
    pub electricity_cost: Decimal,
    pub service_cost: Decimal,
    pub total: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct CostCalculator {
    estimated_power_kw: Decimal,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_ESTIMATED_POWER_KW)
    }
}

impl CostCalculator {
    pub fn new(estimated_power_kw: Decimal) -> Self {
        Self { estimated_power_kw }
    }

    pub fn cost(&self, energy_kwh: Decimal, rate: &Rate) -> DomainResult<Decimal> {
        let total = checked_product(energy_kwh, rate.unit_price()?, "session cost")?;
        Ok(round_money(total))
    }

    /// Energy implied by running at the configured power for `active_seconds`,
    /// capped at the largest reading a meter may report.
    pub fn estimate_energy(&self, active_seconds: i64) -> Decimal {
        let hours = Decimal::from(active_seconds.max(0)) / Decimal::from(3600);
        hours
            .checked_mul(self.estimated_power_kw)
            .map_or(MAX_ENERGY_KWH, |kwh| round_energy(kwh).min(MAX_ENERGY_KWH))
    }

    /// Measured energy when telemetry exists, else the duration estimate.
    pub fn resolve_energy(&self, measured_kwh: Option<Decimal>, active_seconds: i64) -> EnergyReading {
        match measured_kwh {
            Some(kwh) => EnergyReading::Measured(round_energy(kwh)),
            None => EnergyReading::Estimated(self.estimate_energy(active_seconds)),
        }
    }

    pub fn breakdown(&self, reading: EnergyReading, rate: &Rate) -> DomainResult<CostBreakdown> {
        let energy = reading.kwh();
        Ok(CostBreakdown {
            energy_kwh: energy,
            energy_estimated: reading.is_estimated(),
            electricity_cost: round_money(checked_product(
                energy,
                rate.electricity_fee_per_kwh,
                "electricity cost",
            )?),
            service_cost: round_money(checked_product(energy, rate.service_fee_per_kwh, "service cost")?),
            total: self.cost(energy, rate)?,
            currency: rate.currency.clone(),
        })
    }
}
