//! HTTPS provider client
//!
//! `POST {base_url}/gateway/pay` opens a payment and answers
//! `{"redirect_url": ...}`; `POST {base_url}/gateway/query` answers
//! `{"trade_status": ..., "trade_no": ...}` or 404 for unknown orders.
//! Both take signed form bodies.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{GatewayConfig, Signer};
use crate::domain::ports::gateway::{FIELD_AMOUNT, FIELD_MERCHANT_ORDER_ID};
use crate::domain::ports::{
    CallbackPayload, PaymentGateway, PaymentQuery, PaymentRedirect, PaymentRequest,
    ProviderTradeStatus, VerifiedCallback,
};
use crate::domain::{DomainError, DomainResult};
use crate::shared::errors::InfraError;

pub struct HttpGateway {
    client: reqwest::Client,
    config: GatewayConfig,
    signer: Signer,
}

#[derive(Debug, Deserialize)]
struct PayResponse {
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    trade_status: Option<String>,
    trade_no: Option<String>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(InfraError::from)?;
        Ok(Self {
            client,
            signer: Signer::new(config.secret.clone()),
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn signed_form(&self, mut fields: BTreeMap<String, String>) -> BTreeMap<String, String> {
        fields.insert("merchant_id".into(), self.config.merchant_id.clone());
        self.signer.sign_in_place(&mut fields);
        fields
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_payment(&self, request: &PaymentRequest) -> DomainResult<PaymentRedirect> {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_MERCHANT_ORDER_ID.to_string(), request.order_id.clone());
        fields.insert(FIELD_AMOUNT.to_string(), request.amount.to_string());
        fields.insert("subject".to_string(), request.subject.clone());
        fields.insert("notify_url".to_string(), self.config.notify_url.clone());
        fields.insert("return_url".to_string(), self.config.return_url.clone());

        debug!(order_id = %request.order_id, amount = %request.amount, "Creating provider payment");
        let response = self
            .client
            .post(self.endpoint("gateway/pay"))
            .form(&self.signed_form(fields))
            .send()
            .await
            .map_err(InfraError::from)?;

        let status = response.status();
        if !status.is_success() {
            warn!(order_id = %request.order_id, status = %status, "Provider refused payment");
            return Err(DomainError::Gateway(format!("provider answered {}", status)));
        }
        let body: PayResponse = response.json().await.map_err(InfraError::from)?;
        Ok(PaymentRedirect {
            order_id: request.order_id.clone(),
            redirect_url: body.redirect_url,
        })
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> DomainResult<VerifiedCallback> {
        self.signer.verify_callback(payload)
    }

    async fn query_payment(&self, order_id: &str) -> DomainResult<PaymentQuery> {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_MERCHANT_ORDER_ID.to_string(), order_id.to_string());

        let response = self
            .client
            .post(self.endpoint("gateway/query"))
            .form(&self.signed_form(fields))
            .send()
            .await
            .map_err(InfraError::from)?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(PaymentQuery::NotFound),
            status if !status.is_success() => {
                return Err(DomainError::Gateway(format!("provider answered {}", status)))
            }
            _ => {}
        }

        let body: QueryResponse = response.json().await.map_err(InfraError::from)?;
        let paid = body
            .trade_status
            .as_deref()
            .and_then(ProviderTradeStatus::parse)
            == Some(ProviderTradeStatus::Success);
        Ok(match (paid, body.trade_no) {
            (true, Some(external_reference)) => PaymentQuery::Paid { external_reference },
            _ => PaymentQuery::NotPaid,
        })
    }
}
