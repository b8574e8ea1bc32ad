//! Order repository interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{Order, OrderStatus, PaymentMethod};
use crate::domain::DomainResult;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new pending order. Fails `AlreadySettled` when a paid order
    /// already references the same session.
    async fn insert(&self, order: &Order) -> DomainResult<()>;
    async fn find_by_id(&self, order_id: &str) -> DomainResult<Option<Order>>;
    async fn find_by_session(&self, session_id: &str) -> DomainResult<Vec<Order>>;
    /// Replace the stored order with `order` only if its status is still
    /// `expected`. Returns `false` on conflict. A charging order moving to
    /// `paid` fails `AlreadySettled` when another order of the same session
    /// is already paid.
    async fn compare_and_swap(&self, expected: OrderStatus, order: &Order) -> DomainResult<bool>;
    /// Pending orders of `method` created before `cutoff`, oldest first.
    async fn find_pending_before(
        &self,
        method: PaymentMethod,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<Vec<Order>>;
}
