//! In-process payment provider
//!
//! Issues redirect URLs without any network call, signs callbacks the way
//! the real provider does and answers status queries from a local table
//! (unknown orders report `NotPaid`).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::info;

use super::Signer;
use crate::domain::ports::gateway::{
    FIELD_AMOUNT, FIELD_EXTERNAL_REFERENCE, FIELD_MERCHANT_ORDER_ID, FIELD_TRADE_STATUS,
};
use crate::domain::ports::{
    CallbackPayload, PaymentGateway, PaymentQuery, PaymentRedirect, PaymentRequest,
    ProviderTradeStatus, VerifiedCallback,
};
use crate::domain::{DomainError, DomainResult};

pub struct SandboxGateway {
    signer: Signer,
    checkout_url: String,
    fail_create: AtomicBool,
    query_results: DashMap<String, PaymentQuery>,
}

impl SandboxGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            signer: Signer::new(secret),
            checkout_url: "https://sandbox.pay.local/checkout".to_string(),
            fail_create: AtomicBool::new(false),
            query_results: DashMap::new(),
        }
    }

    /// Build a callback signed with this sandbox's secret.
    pub fn signed_callback(
        &self,
        order_id: &str,
        trade_no: &str,
        status: ProviderTradeStatus,
        amount: Decimal,
    ) -> CallbackPayload {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_MERCHANT_ORDER_ID.to_string(), order_id.to_string());
        fields.insert(FIELD_EXTERNAL_REFERENCE.to_string(), trade_no.to_string());
        fields.insert(FIELD_TRADE_STATUS.to_string(), status.as_str().to_string());
        fields.insert(FIELD_AMOUNT.to_string(), amount.to_string());
        self.signer.sign_in_place(&mut fields);
        CallbackPayload { fields }
    }

    /// Make `create_payment` fail as if the provider were unreachable.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_query_result(&self, order_id: &str, result: PaymentQuery) {
        self.query_results.insert(order_id.to_string(), result);
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_payment(&self, request: &PaymentRequest) -> DomainResult<PaymentRedirect> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DomainError::Gateway("sandbox: provider unavailable".into()));
        }
        info!(order_id = %request.order_id, amount = %request.amount, "Sandbox payment created");
        Ok(PaymentRedirect {
            order_id: request.order_id.clone(),
            redirect_url: format!(
                "{}?out_trade_no={}&total_amount={}",
                self.checkout_url, request.order_id, request.amount
            ),
        })
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> DomainResult<VerifiedCallback> {
        self.signer.verify_callback(payload)
    }

    async fn query_payment(&self, order_id: &str) -> DomainResult<PaymentQuery> {
        Ok(self
            .query_results
            .get(order_id)
            .map(|r| r.clone())
            .unwrap_or(PaymentQuery::NotPaid))
    }
}
