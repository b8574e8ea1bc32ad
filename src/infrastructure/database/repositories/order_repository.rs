//! SeaORM implementation of OrderRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::debug;

use super::{db_err, is_unique_violation, parse_column};
use crate::domain::order::OrderRepository;
use crate::domain::{
    DomainError, DomainResult, Order, OrderStatus, OrderType, PaymentMethod,
};
use crate::infrastructure::database::entities::order::{self, Column};
use crate::shared::money::{from_minor_units, to_minor_units};

pub struct SeaOrmOrderRepository {
    db: DatabaseConnection,
}

impl SeaOrmOrderRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

pub(super) fn model_to_domain(m: order::Model) -> DomainResult<Order> {
    Ok(Order {
        order_id: m.order_id,
        user_id: m.user_id,
        order_type: parse_column(&m.order_type, "order_type", OrderType::parse)?,
        amount: from_minor_units(m.amount),
        payment_method: parse_column(&m.payment_method, "payment_method", PaymentMethod::parse)?,
        session_id: m.session_id,
        status: parse_column(&m.status, "status", OrderStatus::parse)?,
        external_reference: m.external_reference,
        cancel_reason: m.cancel_reason,
        created_at: m.created_at,
        updated_at: m.updated_at,
        paid_at: m.paid_at,
    })
}

pub(super) fn to_active_model(o: &Order) -> DomainResult<order::ActiveModel> {
    Ok(order::ActiveModel {
        order_id: Set(o.order_id.clone()),
        user_id: Set(o.user_id.clone()),
        order_type: Set(o.order_type.as_str().to_string()),
        amount: Set(to_minor_units(o.amount)?),
        payment_method: Set(o.payment_method.as_str().to_string()),
        session_id: Set(o.session_id.clone()),
        status: Set(o.status.as_str().to_string()),
        external_reference: Set(o.external_reference.clone()),
        cancel_reason: Set(o.cancel_reason.clone()),
        created_at: Set(o.created_at),
        updated_at: Set(o.updated_at),
        paid_at: Set(o.paid_at),
    })
}

pub(super) async fn find_order<C: ConnectionTrait>(conn: &C, order_id: &str) -> DomainResult<Order> {
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(db_err)?
        .map(model_to_domain)
        .transpose()?
        .ok_or_else(|| DomainError::not_found("Order", "order_id", order_id))
}

/// The paid order of a session other than `order_id`, if any.
pub(super) async fn other_paid_order<C: ConnectionTrait>(
    conn: &C,
    session_id: &str,
    order_id: &str,
) -> DomainResult<Option<order::Model>> {
    order::Entity::find()
        .filter(Column::SessionId.eq(session_id))
        .filter(Column::Status.eq(OrderStatus::Paid.as_str()))
        .filter(Column::OrderId.ne(order_id))
        .one(conn)
        .await
        .map_err(db_err)
}

/// Write `order` over a row still at `expected`. Returns `false` when the
/// row moved on. Colliding with the session's paid slot is `AlreadySettled`.
pub(super) async fn swap_order<C: ConnectionTrait>(
    conn: &C,
    expected: OrderStatus,
    order: &Order,
) -> DomainResult<bool> {
    let result = order::Entity::update_many()
        .set(to_active_model(order)?)
        .filter(Column::OrderId.eq(&order.order_id))
        .filter(Column::Status.eq(expected.as_str()))
        .exec(conn)
        .await;

    match result {
        Ok(res) => Ok(res.rows_affected == 1),
        Err(e) if is_unique_violation(&e) => Err(DomainError::AlreadySettled(
            order.session_id.clone().unwrap_or_default(),
        )),
        Err(e) => Err(db_err(e)),
    }
}

// ── OrderRepository impl ────────────────────────────────────────

#[async_trait]
impl OrderRepository for SeaOrmOrderRepository {
    async fn insert(&self, order: &Order) -> DomainResult<()> {
        debug!(order_id = %order.order_id, amount = %order.amount, "Inserting order");
        if let Some(session_id) = &order.session_id {
            if other_paid_order(&self.db, session_id, &order.order_id).await?.is_some() {
                return Err(DomainError::AlreadySettled(session_id.clone()));
            }
        }

        match to_active_model(order)?.insert(&self.db).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DomainError::Validation(format!(
                "order {} already exists",
                order.order_id
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn find_by_id(&self, order_id: &str) -> DomainResult<Option<Order>> {
        order::Entity::find_by_id(order_id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()
    }

    async fn find_by_session(&self, session_id: &str) -> DomainResult<Vec<Order>> {
        order::Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }

    async fn compare_and_swap(&self, expected: OrderStatus, order: &Order) -> DomainResult<bool> {
        if order.status == OrderStatus::Paid {
            if let Some(session_id) = &order.session_id {
                if other_paid_order(&self.db, session_id, &order.order_id).await?.is_some() {
                    return Err(DomainError::AlreadySettled(session_id.clone()));
                }
            }
        }

        if swap_order(&self.db, expected, order).await? {
            return Ok(true);
        }
        match self.find_by_id(&order.order_id).await? {
            Some(_) => Ok(false),
            None => Err(DomainError::not_found("Order", "order_id", &order.order_id)),
        }
    }

    async fn find_pending_before(
        &self,
        method: PaymentMethod,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<Vec<Order>> {
        order::Entity::find()
            .filter(Column::Status.eq(OrderStatus::Pending.as_str()))
            .filter(Column::PaymentMethod.eq(method.as_str()))
            .filter(Column::CreatedAt.lt(cutoff))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }
}
