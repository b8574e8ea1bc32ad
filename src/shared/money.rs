//! Money and energy helpers
//!
//! Amounts are `Decimal` with two fractional digits; energy is kWh with
//! three fractional digits (one Wh). Persistence uses integer minor units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::errors::DomainError;

/// Fractional digits kept for monetary amounts.
pub const MONEY_SCALE: u32 = 2;

/// Fractional digits kept for energy readings (Wh resolution).
pub const ENERGY_SCALE: u32 = 3;

/// Largest cumulative meter reading accepted, in kWh.
pub const MAX_ENERGY_KWH: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Largest per-kWh fee accepted for either rate component.
pub const MAX_FEE_PER_KWH: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Half-up rounding to two decimals.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Half-up rounding to whole Wh.
pub fn round_energy(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(ENERGY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Rejects non-positive amounts and amounts with sub-cent precision.
pub fn ensure_payable(amount: Decimal) -> Result<Decimal, DomainError> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(amount));
    }
    if round_money(amount) != amount {
        return Err(DomainError::Validation(format!(
            "amount {} has more than {} decimal places",
            amount, MONEY_SCALE
        )));
    }
    Ok(amount)
}

/// `a * b`, or a validation error naming `what` when the product overflows.
pub fn checked_product(a: Decimal, b: Decimal, what: &str) -> Result<Decimal, DomainError> {
    a.checked_mul(b)
        .ok_or_else(|| DomainError::Validation(format!("{} overflows ({} x {})", what, a, b)))
}

pub fn to_minor_units(amount: Decimal) -> Result<i64, DomainError> {
    round_money(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| DomainError::Validation(format!("amount {} out of range", amount)))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}

pub fn kwh_to_wh(kwh: Decimal) -> Result<i64, DomainError> {
    round_energy(kwh)
        .checked_mul(Decimal::ONE_THOUSAND)
        .and_then(|wh| wh.to_i64())
        .ok_or_else(|| DomainError::Validation(format!("energy {} out of range", kwh)))
}

pub fn wh_to_kwh(wh: i64) -> Decimal {
    Decimal::new(wh, ENERGY_SCALE)
}
