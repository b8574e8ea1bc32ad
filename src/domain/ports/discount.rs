//! Discount hook consumed at settlement time

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::session::ChargingSession;
use crate::domain::DomainResult;

/// Amount to take off a closed session's cost before an order is opened.
///
/// Coupon rules live outside this service; only the resulting amount is used.
#[async_trait]
pub trait DiscountPolicy: Send + Sync {
    async fn discount_for(&self, session: &ChargingSession) -> DomainResult<Decimal>;
}

/// Default policy: nothing off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscount;

#[async_trait]
impl DiscountPolicy for NoDiscount {
    async fn discount_for(&self, _session: &ChargingSession) -> DomainResult<Decimal> {
        Ok(Decimal::ZERO)
    }
}
