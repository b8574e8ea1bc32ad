//! Order registry
//!
//! Orders change status through a compare-and-swap on the status the caller
//! read. Moving money is the settlement store's job; `mark_paid` here only
//! covers orders whose payment needs no ledger entry.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::application::events::{Event, OrderCancelledEvent, SharedEventBus};
use crate::domain::{
    DomainError, DomainResult, Order, OrderStatus, OrderType, PaidTransition, PaymentMethod,
    RepositoryProvider,
};

/// Status CAS conflicts mean another writer moved the order; re-reading
/// makes the domain transition fail or no-op, so a few rounds suffice.
const MAX_CAS_ATTEMPTS: usize = 5;

pub struct OrderRegistry {
    repos: Arc<dyn RepositoryProvider>,
    events: SharedEventBus,
}

impl OrderRegistry {
    pub fn new(repos: Arc<dyn RepositoryProvider>, events: SharedEventBus) -> Self {
        Self { repos, events }
    }

    pub async fn create_order(
        &self,
        user_id: &str,
        amount: Decimal,
        order_type: OrderType,
        payment_method: PaymentMethod,
        session_id: Option<&str>,
    ) -> DomainResult<Order> {
        let order = Order::new(
            user_id,
            amount,
            order_type,
            payment_method,
            session_id.map(str::to_string),
            Utc::now(),
        )?;

        if let Some(session_id) = session_id {
            let orders = self.repos.orders().find_by_session(session_id).await?;
            if orders.iter().any(|o| o.status == OrderStatus::Paid) {
                return Err(DomainError::AlreadySettled(session_id.to_string()));
            }
        }

        self.repos.orders().insert(&order).await?;
        info!(
            order_id = %order.order_id,
            user_id,
            session_id = ?order.session_id,
            order_type = %order.order_type,
            method = %order.payment_method,
            amount = %order.amount,
            "Order created"
        );
        Ok(order)
    }

    pub async fn get(&self, order_id: &str) -> DomainResult<Order> {
        self.repos
            .orders()
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", "order_id", order_id))
    }

    /// `pending → paid`. A repeat with the same reference returns the order
    /// unchanged.
    pub async fn mark_paid(
        &self,
        order_id: &str,
        external_reference: Option<&str>,
    ) -> DomainResult<Order> {
        self.transition(order_id, "mark paid", |order| {
            order.mark_paid(external_reference, Utc::now())
        })
        .await
    }

    /// `pending → cancelled`.
    pub async fn cancel(&self, order_id: &str, reason: &str) -> DomainResult<Order> {
        let order = self
            .transition(order_id, "cancel", |order| {
                order.cancel(reason, Utc::now()).map(|()| PaidTransition::Applied)
            })
            .await?;

        info!(order_id, reason, "Order cancelled");
        self.events.publish(Event::OrderCancelled(OrderCancelledEvent {
            order_id: order_id.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }));
        Ok(order)
    }

    pub async fn for_session(&self, session_id: &str) -> DomainResult<Vec<Order>> {
        self.repos.orders().find_by_session(session_id).await
    }

    /// The pending order of a session, if any. A session has at most one
    /// open order at a time because settlement cancels before re-creating.
    pub async fn open_for_session(&self, session_id: &str) -> DomainResult<Option<Order>> {
        let orders = self.repos.orders().find_by_session(session_id).await?;
        Ok(orders.into_iter().rev().find(Order::is_pending))
    }

    /// Pending orders of `method` older than `older_than`.
    pub async fn stale_pending(
        &self,
        method: PaymentMethod,
        older_than: Duration,
    ) -> DomainResult<Vec<Order>> {
        self.repos
            .orders()
            .find_pending_before(method, Utc::now() - older_than)
            .await
    }

    async fn transition<F>(
        &self,
        order_id: &str,
        operation: &'static str,
        mutate: F,
    ) -> DomainResult<Order>
    where
        F: Fn(&mut Order) -> DomainResult<PaidTransition>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.get(order_id).await?;
            let mut next = current.clone();
            if mutate(&mut next)? == PaidTransition::AlreadyApplied {
                return Ok(current);
            }
            if self.repos.orders().compare_and_swap(current.status, &next).await? {
                return Ok(next);
            }
            debug!(order_id, operation, attempt, "Order CAS conflict, re-reading");
        }
        Err(self.get(order_id).await?.invalid_state(operation))
    }
}
