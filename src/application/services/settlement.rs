//! Session settlement
//!
//! Turns a closed session's cost into a paid order, either synchronously
//! from the wallet or by handing off to the gateway. A failed settlement
//! leaves the session `paymentStatus=pending`; it is never reversed.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::application::events::{
    Event, PaymentAwaitingEvent, SettlementCompletedEvent, SettlementFailedEvent, SharedEventBus,
};
use crate::application::services::orders::OrderRegistry;
use crate::application::services::reconciliation::ReconciliationEngine;
use crate::domain::ports::{DiscountPolicy, PaymentRedirect};
use crate::domain::{
    ChargingSession, DomainError, DomainResult, Order, OrderType, PaymentMethod, PaymentStatus,
    RepositoryProvider, WalletTransaction,
};
use crate::shared::money::round_money;
use crate::shared::utills::retry::{retry_transient, RetryConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Paid {
        order: Order,
        entry: Option<WalletTransaction>,
    },
    AwaitingGateway {
        order: Order,
        redirect: PaymentRedirect,
    },
    /// Payable amount was zero
    NotRequired,
    Failed {
        order: Option<Order>,
        error: DomainError,
    },
}

impl SettlementOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Paid { .. } => "paid",
            Self::AwaitingGateway { .. } => "awaiting_gateway",
            Self::NotRequired => "not_required",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn order(&self) -> Option<&Order> {
        match self {
            Self::Paid { order, .. } | Self::AwaitingGateway { order, .. } => Some(order),
            Self::Failed { order, .. } => order.as_ref(),
            Self::NotRequired => None,
        }
    }
}

pub struct SettlementService {
    repos: Arc<dyn RepositoryProvider>,
    orders: Arc<OrderRegistry>,
    reconciliation: Arc<ReconciliationEngine>,
    discounts: Arc<dyn DiscountPolicy>,
    retry: RetryConfig,
    events: SharedEventBus,
}

impl SettlementService {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        orders: Arc<OrderRegistry>,
        reconciliation: Arc<ReconciliationEngine>,
        discounts: Arc<dyn DiscountPolicy>,
        retry: RetryConfig,
        events: SharedEventBus,
    ) -> Self {
        Self {
            repos,
            orders,
            reconciliation,
            discounts,
            retry,
            events,
        }
    }

    /// Settle a session that has just been closed, with the method chosen at start.
    pub async fn settle_session(&self, session: &ChargingSession) -> SettlementOutcome {
        self.settle(session, session.payment_method).await
    }

    /// Re-attempt settlement of a closed session whose payment is pending.
    /// `method` defaults to the one chosen at start.
    pub async fn retry_settlement(
        &self,
        session_id: &str,
        user_id: &str,
        method: Option<PaymentMethod>,
    ) -> DomainResult<SettlementOutcome> {
        let session = self
            .repos
            .sessions()
            .find_by_id(session_id)
            .await?
            .filter(|s| s.is_owned_by(user_id))
            .ok_or_else(|| DomainError::not_found("ChargingSession", "session_id", session_id))?;

        if session.is_open() {
            return Err(session.invalid_state("retry settlement"));
        }
        match session.payment_status {
            PaymentStatus::Paid => return Err(DomainError::AlreadySettled(session.session_id)),
            PaymentStatus::NotRequired => return Ok(SettlementOutcome::NotRequired),
            PaymentStatus::Pending => {}
        }

        let method = method.unwrap_or(session.payment_method);
        info!(session_id, user_id, method = %method, "Retrying settlement");
        Ok(self.settle(&session, method).await)
    }

    async fn settle(&self, session: &ChargingSession, method: PaymentMethod) -> SettlementOutcome {
        let outcome = match self.try_settle(session, method).await {
            Ok(outcome) => outcome,
            Err(error) => SettlementOutcome::Failed { order: None, error },
        };

        metrics::counter!(
            "settlements_total",
            "method" => method.as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);
        self.publish(session, &outcome);
        outcome
    }

    async fn try_settle(
        &self,
        session: &ChargingSession,
        method: PaymentMethod,
    ) -> DomainResult<SettlementOutcome> {
        let discount = self.discounts.discount_for(session).await?;
        let payable = session
            .total_cost
            .checked_sub(discount)
            .map(|net| round_money(net.max(Decimal::ZERO)))
            .ok_or_else(|| {
                DomainError::Validation(format!("discount {} out of range", discount))
            })?;

        if payable.is_zero() {
            self.repos
                .sessions()
                .set_payment_status(&session.session_id, PaymentStatus::NotRequired)
                .await?;
            info!(session_id = %session.session_id, "Nothing to pay");
            return Ok(SettlementOutcome::NotRequired);
        }

        let order = self.order_for(session, method, payable).await?;

        match order.payment_method {
            PaymentMethod::Balance => Ok(self.settle_from_balance(order).await),
            PaymentMethod::Gateway => {
                match self.reconciliation.create_external_payment(&order).await {
                    Ok(redirect) => Ok(SettlementOutcome::AwaitingGateway { order, redirect }),
                    Err(error) => {
                        let order = self.orders.get(&order.order_id).await.unwrap_or(order);
                        Ok(SettlementOutcome::Failed {
                            order: Some(order),
                            error,
                        })
                    }
                }
            }
        }
    }

    /// Reuse the session's pending order when it still fits, otherwise cancel
    /// it and open a fresh one. A balance order whose debit already landed is
    /// always resumed so the commit can finish.
    async fn order_for(
        &self,
        session: &ChargingSession,
        method: PaymentMethod,
        payable: Decimal,
    ) -> DomainResult<Order> {
        if let Some(open) = self.orders.open_for_session(&session.session_id).await? {
            if self.repos.wallets().find_by_order(&open.order_id).await?.is_some() {
                return Ok(open);
            }
            if open.payment_method == method && open.amount == payable {
                return Ok(open);
            }
            self.orders
                .cancel(&open.order_id, &format!("superseded by {} settlement", method))
                .await?;
        }

        self.orders
            .create_order(
                &session.user_id,
                payable,
                OrderType::Charging,
                method,
                Some(&session.session_id),
            )
            .await
    }

    async fn settle_from_balance(&self, order: Order) -> SettlementOutcome {
        let store = self.repos.settlement();
        let order_id = order.order_id.clone();
        let result = retry_transient(
            &self.retry,
            || store.settle_from_balance(&order_id),
            "settle_from_balance",
        )
        .await;

        match result {
            Ok(receipt) => {
                if receipt.entry.is_some() && !receipt.already_applied {
                    metrics::counter!("wallet_entries_total", "kind" => "debit").increment(1);
                }
                SettlementOutcome::Paid {
                    order: receipt.order,
                    entry: receipt.entry,
                }
            }
            Err(DomainError::AlreadySettled(session_id)) => {
                warn!(order_id = %order_id, session_id = %session_id, "Session already settled by another order");
                let order = match self.orders.cancel(&order_id, "session already settled").await {
                    Ok(cancelled) => cancelled,
                    Err(_) => order,
                };
                SettlementOutcome::Failed {
                    order: Some(order),
                    error: DomainError::AlreadySettled(session_id),
                }
            }
            Err(error) => SettlementOutcome::Failed {
                order: Some(order),
                error,
            },
        }
    }

    fn publish(&self, session: &ChargingSession, outcome: &SettlementOutcome) {
        let now = Utc::now();
        match outcome {
            SettlementOutcome::Paid { order, .. } => {
                info!(
                    session_id = %session.session_id,
                    order_id = %order.order_id,
                    user_id = %order.user_id,
                    amount = %order.amount,
                    "Session settled from balance"
                );
                self.events.publish(Event::SettlementCompleted(SettlementCompletedEvent {
                    order_id: order.order_id.clone(),
                    session_id: Some(session.session_id.clone()),
                    user_id: order.user_id.clone(),
                    amount: order.amount,
                    payment_method: order.payment_method.to_string(),
                    timestamp: now,
                }));
            }
            SettlementOutcome::AwaitingGateway { order, redirect } => {
                info!(
                    session_id = %session.session_id,
                    order_id = %order.order_id,
                    amount = %order.amount,
                    "Awaiting gateway payment"
                );
                self.events.publish(Event::PaymentAwaiting(PaymentAwaitingEvent {
                    order_id: order.order_id.clone(),
                    session_id: Some(session.session_id.clone()),
                    redirect_url: redirect.redirect_url.clone(),
                    timestamp: now,
                }));
            }
            SettlementOutcome::NotRequired => {}
            SettlementOutcome::Failed { order, error } => {
                if error.is_transient() {
                    error!(session_id = %session.session_id, error = %error, "Settlement failed");
                } else {
                    warn!(session_id = %session.session_id, error = %error, "Settlement failed");
                }
                self.events.publish(Event::SettlementFailed(SettlementFailedEvent {
                    session_id: session.session_id.clone(),
                    order_id: order.as_ref().map(|o| o.order_id.clone()),
                    error: error.to_string(),
                    timestamp: now,
                }));
            }
        }
    }
}
