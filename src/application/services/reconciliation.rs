//! Gateway reconciliation engine
//!
//! Callbacks are handled in two steps. `evaluate` reads state and decides a
//! [`CallbackEffect`]; `apply` commits it idempotently. Duplicate, late or
//! concurrent deliveries of the same callback converge on one commit.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::application::events::{
    CallbackRejectedEvent, Event, SettlementCompletedEvent, SharedEventBus, WalletCreditedEvent,
};
use crate::application::services::orders::OrderRegistry;
use crate::domain::ports::gateway::FIELD_MERCHANT_ORDER_ID;
use crate::domain::ports::{
    CallbackPayload, PaymentGateway, PaymentQuery, PaymentRedirect, PaymentRequest,
    ProviderTradeStatus,
};
use crate::domain::{
    DomainError, DomainResult, Order, OrderStatus, OrderType, PaymentMethod, RepositoryProvider,
    SettlementReceipt,
};
use crate::shared::utills::retry::{retry_transient, RetryConfig};

/// Reply owed to the provider. Anything but `Success` makes it redeliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackAck {
    Success,
    Failure,
}

impl CallbackAck {
    /// Body expected by the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    InvalidSignature,
    Malformed(String),
    AmountMismatch { expected: Decimal, received: Decimal },
    /// The order is cancelled or refunded and cannot take a payment
    StaleOrder(OrderStatus),
    /// A balance order cannot be paid through the gateway
    NotGatewayOrder,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "invalid signature"),
            Self::Malformed(msg) => write!(f, "malformed callback: {}", msg),
            Self::AmountMismatch { expected, received } => {
                write!(f, "amount mismatch: expected {}, received {}", expected, received)
            }
            Self::StaleOrder(status) => write!(f, "order is {}", status),
            Self::NotGatewayOrder => write!(f, "order is not a gateway order"),
        }
    }
}

/// Decision reached by [`ReconciliationEngine::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEffect {
    Reject {
        order_id: Option<String>,
        reason: RejectReason,
    },
    /// Nothing to do, acknowledged so the provider stops retrying
    Ignore {
        order_id: Option<String>,
        reason: &'static str,
    },
    AlreadyApplied {
        order_id: String,
    },
    ConfirmPayment {
        order_id: String,
        external_reference: String,
    },
}

impl CallbackEffect {
    fn outcome_label(&self) -> &'static str {
        match self {
            Self::Reject { .. } => "rejected",
            Self::Ignore { .. } => "ignored",
            Self::AlreadyApplied { .. } => "duplicate",
            Self::ConfirmPayment { .. } => "confirmed",
        }
    }
}

/// A recharge waiting for the user to pay at the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RechargeStarted {
    pub order: Order,
    pub redirect: PaymentRedirect,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

pub struct ReconciliationEngine {
    repos: Arc<dyn RepositoryProvider>,
    orders: Arc<OrderRegistry>,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryConfig,
    events: SharedEventBus,
}

impl ReconciliationEngine {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        orders: Arc<OrderRegistry>,
        gateway: Arc<dyn PaymentGateway>,
        retry: RetryConfig,
        events: SharedEventBus,
    ) -> Self {
        Self {
            repos,
            orders,
            gateway,
            retry,
            events,
        }
    }

    /// Ask the provider to open a payment for a pending gateway order. When
    /// the provider cannot be reached the order is cancelled; the caller may
    /// retry with a fresh one.
    pub async fn create_external_payment(&self, order: &Order) -> DomainResult<PaymentRedirect> {
        if order.payment_method != PaymentMethod::Gateway {
            return Err(DomainError::Validation(format!(
                "order {} is not a gateway order",
                order.order_id
            )));
        }
        if !order.is_pending() {
            return Err(order.invalid_state("create external payment"));
        }

        let request = PaymentRequest {
            order_id: order.order_id.clone(),
            amount: order.amount,
            subject: match order.order_type {
                OrderType::Charging => format!("Charging {}", order.session_id.as_deref().unwrap_or_default()),
                OrderType::Recharge => "Wallet recharge".to_string(),
            },
        };

        match self.gateway.create_payment(&request).await {
            Ok(redirect) => {
                info!(
                    order_id = %order.order_id,
                    amount = %order.amount,
                    "External payment created"
                );
                Ok(redirect)
            }
            Err(e) => {
                warn!(order_id = %order.order_id, error = %e, "Gateway request failed, cancelling order");
                if let Err(cancel_err) = self
                    .orders
                    .cancel(&order.order_id, &format!("gateway request failed: {}", e))
                    .await
                {
                    error!(order_id = %order.order_id, error = %cancel_err, "Failed to cancel order");
                }
                Err(e)
            }
        }
    }

    /// Open a recharge order for an existing wallet and return the redirect.
    pub async fn start_recharge(&self, user_id: &str, amount: Decimal) -> DomainResult<RechargeStarted> {
        if self.repos.wallets().find(user_id).await?.is_none() {
            return Err(DomainError::not_found("Wallet", "user_id", user_id));
        }
        let order = self
            .orders
            .create_order(user_id, amount, OrderType::Recharge, PaymentMethod::Gateway, None)
            .await?;
        let redirect = self.create_external_payment(&order).await?;
        Ok(RechargeStarted { order, redirect })
    }

    /// Verify and classify a callback. Reads only.
    pub async fn evaluate(&self, payload: &CallbackPayload) -> DomainResult<CallbackEffect> {
        let callback = match self.gateway.verify_callback(payload) {
            Ok(callback) => callback,
            Err(DomainError::InvalidSignature) => {
                warn!(
                    order_id = ?payload.get(FIELD_MERCHANT_ORDER_ID),
                    "Callback signature verification failed"
                );
                return Ok(CallbackEffect::Reject {
                    order_id: None,
                    reason: RejectReason::InvalidSignature,
                });
            }
            Err(e) => {
                warn!(error = %e, "Malformed callback");
                return Ok(CallbackEffect::Reject {
                    order_id: None,
                    reason: RejectReason::Malformed(e.to_string()),
                });
            }
        };

        let order_id = callback.merchant_order_id.clone();
        if callback.status != ProviderTradeStatus::Success {
            debug!(order_id = %order_id, status = callback.status.as_str(), "Non-success callback");
            return Ok(CallbackEffect::Ignore {
                order_id: Some(order_id),
                reason: "provider status is not success",
            });
        }

        let Some(order) = self.repos.orders().find_by_id(&order_id).await? else {
            warn!(order_id = %order_id, "Callback for unknown order");
            return Ok(CallbackEffect::Ignore {
                order_id: Some(order_id),
                reason: "unknown order",
            });
        };

        if order.payment_method != PaymentMethod::Gateway {
            return Ok(CallbackEffect::Reject {
                order_id: Some(order_id),
                reason: RejectReason::NotGatewayOrder,
            });
        }
        if callback.amount != order.amount {
            return Ok(CallbackEffect::Reject {
                order_id: Some(order_id),
                reason: RejectReason::AmountMismatch {
                    expected: order.amount,
                    received: callback.amount,
                },
            });
        }

        Ok(match order.status {
            OrderStatus::Pending => CallbackEffect::ConfirmPayment {
                order_id,
                external_reference: callback.external_reference,
            },
            OrderStatus::Paid => {
                if order.external_reference.as_deref() != Some(callback.external_reference.as_str()) {
                    error!(
                        order_id = %order_id,
                        recorded = ?order.external_reference,
                        received = %callback.external_reference,
                        "Paid order confirmed again under another trade; manual refund required"
                    );
                }
                CallbackEffect::AlreadyApplied { order_id }
            }
            status @ (OrderStatus::Cancelled | OrderStatus::Refunded) => CallbackEffect::Reject {
                order_id: Some(order_id),
                reason: RejectReason::StaleOrder(status),
            },
        })
    }

    /// Commit an evaluated effect. Safe to call repeatedly.
    pub async fn apply(&self, effect: CallbackEffect) -> CallbackAck {
        let label = effect.outcome_label();
        let ack = match effect {
            CallbackEffect::Reject { order_id, reason } => {
                warn!(order_id = ?order_id, reason = %reason, "Callback rejected");
                self.events.publish(Event::CallbackRejected(CallbackRejectedEvent {
                    order_id,
                    reason: reason.to_string(),
                    timestamp: Utc::now(),
                }));
                CallbackAck::Failure
            }
            CallbackEffect::Ignore { order_id, reason } => {
                debug!(order_id = ?order_id, reason, "Callback ignored");
                CallbackAck::Success
            }
            CallbackEffect::AlreadyApplied { order_id } => {
                debug!(order_id = %order_id, "Callback already applied");
                CallbackAck::Success
            }
            CallbackEffect::ConfirmPayment {
                order_id,
                external_reference,
            } => self.confirm(&order_id, &external_reference).await,
        };
        metrics::counter!("gateway_callbacks_total", "outcome" => label, "ack" => ack.as_str())
            .increment(1);
        ack
    }

    pub async fn handle_callback(&self, payload: &CallbackPayload) -> CallbackAck {
        match self.evaluate(payload).await {
            Ok(effect) => self.apply(effect).await,
            Err(e) => {
                error!(error = %e, "Callback evaluation failed");
                metrics::counter!("gateway_callbacks_total", "outcome" => "error", "ack" => "fail")
                    .increment(1);
                CallbackAck::Failure
            }
        }
    }

    /// Resolve gateway orders pending longer than `ttl`: confirm the ones the
    /// provider reports paid, cancel the rest.
    pub async fn sweep(&self, ttl: Duration) -> DomainResult<SweepReport> {
        let stale = self.orders.stale_pending(PaymentMethod::Gateway, ttl).await?;
        let mut report = SweepReport {
            examined: stale.len(),
            ..Default::default()
        };

        for order in stale {
            match self.gateway.query_payment(&order.order_id).await {
                Ok(PaymentQuery::Paid { external_reference }) => {
                    match self.confirm(&order.order_id, &external_reference).await {
                        CallbackAck::Success => report.confirmed += 1,
                        CallbackAck::Failure => report.failed += 1,
                    }
                }
                Ok(PaymentQuery::NotPaid | PaymentQuery::NotFound) => {
                    match self.orders.cancel(&order.order_id, "payment expired").await {
                        Ok(_) => report.cancelled += 1,
                        // resolved concurrently by a callback
                        Err(DomainError::InvalidOrderState { .. }) => {}
                        Err(e) => {
                            warn!(order_id = %order.order_id, error = %e, "Failed to cancel stale order");
                            report.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(order_id = %order.order_id, error = %e, "Payment query failed");
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                confirmed = report.confirmed,
                cancelled = report.cancelled,
                failed = report.failed,
                "Pending order sweep finished"
            );
        }
        Ok(report)
    }

    async fn confirm(&self, order_id: &str, external_reference: &str) -> CallbackAck {
        let store = self.repos.settlement();
        let result = retry_transient(
            &self.retry,
            || store.confirm_gateway_payment(order_id, external_reference),
            "confirm_gateway_payment",
        )
        .await;

        match result {
            Ok(receipt) => {
                if !receipt.already_applied {
                    self.publish_confirmed(&receipt);
                }
                CallbackAck::Success
            }
            Err(DomainError::AlreadySettled(session_id)) => {
                error!(
                    order_id,
                    session_id = %session_id,
                    external_reference,
                    "Session already paid by another order; refund required"
                );
                if let Err(e) = self
                    .orders
                    .cancel(order_id, "session already settled; refund required")
                    .await
                {
                    error!(order_id, error = %e, "Failed to cancel duplicate payment order");
                }
                CallbackAck::Success
            }
            Err(DomainError::InvalidOrderState { .. }) => {
                // Lost a race: paid under the same trade means done.
                match self.repos.orders().find_by_id(order_id).await {
                    Ok(Some(order)) if order.status == OrderStatus::Paid => CallbackAck::Success,
                    _ => CallbackAck::Failure,
                }
            }
            Err(e) => {
                error!(order_id, error = %e, "Failed to apply gateway payment");
                CallbackAck::Failure
            }
        }
    }

    fn publish_confirmed(&self, receipt: &SettlementReceipt) {
        let order = &receipt.order;
        info!(
            order_id = %order.order_id,
            user_id = %order.user_id,
            session_id = ?order.session_id,
            amount = %order.amount,
            external_reference = ?order.external_reference,
            "Gateway payment applied"
        );
        metrics::counter!("settlements_total", "method" => "gateway", "outcome" => "paid").increment(1);
        if let Some(entry) = &receipt.entry {
            metrics::counter!("wallet_entries_total", "kind" => entry.entry_type.as_str()).increment(1);
            self.events.publish(Event::WalletCredited(WalletCreditedEvent {
                user_id: entry.user_id.clone(),
                order_id: order.order_id.clone(),
                amount: entry.amount,
                balance_after: entry.balance_after,
                timestamp: Utc::now(),
            }));
        }
        self.events.publish(Event::SettlementCompleted(SettlementCompletedEvent {
            order_id: order.order_id.clone(),
            session_id: order.session_id.clone(),
            user_id: order.user_id.clone(),
            amount: order.amount,
            payment_method: order.payment_method.to_string(),
            timestamp: Utc::now(),
        }));
    }
}
