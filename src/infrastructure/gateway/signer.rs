//! Callback and request signing
//!
//! Canonical form: every non-empty field except `sign`, sorted by key,
//! joined as `k=v&k=v`, then `&key=<secret>` appended. The signature is the
//! upper-case hex SHA-256 of that string.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::domain::ports::gateway::{
    FIELD_AMOUNT, FIELD_EXTERNAL_REFERENCE, FIELD_MERCHANT_ORDER_ID, FIELD_SIGN,
    FIELD_TRADE_STATUS,
};
use crate::domain::ports::{CallbackPayload, ProviderTradeStatus, VerifiedCallback};
use crate::domain::{DomainError, DomainResult};

#[derive(Clone)]
pub struct Signer {
    secret: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn canonical(fields: &BTreeMap<String, String>) -> String {
        fields
            .iter()
            .filter(|(k, v)| k.as_str() != FIELD_SIGN && !v.is_empty())
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn sign(&self, fields: &BTreeMap<String, String>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::canonical(fields).as_bytes());
        hasher.update(b"&key=");
        hasher.update(self.secret.as_bytes());
        hex::encode_upper(hasher.finalize())
    }

    /// Add the `sign` field to `fields`.
    pub fn sign_in_place(&self, fields: &mut BTreeMap<String, String>) {
        let sign = self.sign(fields);
        fields.insert(FIELD_SIGN.to_string(), sign);
    }

    pub fn verify(&self, fields: &BTreeMap<String, String>) -> bool {
        match fields.get(FIELD_SIGN) {
            Some(received) => constant_time_eq(
                self.sign(fields).as_bytes(),
                received.to_ascii_uppercase().as_bytes(),
            ),
            None => false,
        }
    }

    /// Check the signature, then parse the fields the reconciliation needs.
    pub fn verify_callback(&self, payload: &CallbackPayload) -> DomainResult<VerifiedCallback> {
        if !self.verify(&payload.fields) {
            return Err(DomainError::InvalidSignature);
        }

        let required = |key: &'static str| {
            payload
                .get(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DomainError::Validation(format!("callback field '{}' is missing", key)))
        };
        let status_raw = required(FIELD_TRADE_STATUS)?;
        let status = ProviderTradeStatus::parse(status_raw).ok_or_else(|| {
            DomainError::Validation(format!("unknown trade_status '{}'", status_raw))
        })?;
        let amount_raw = required(FIELD_AMOUNT)?;
        let amount: Decimal = amount_raw
            .parse()
            .map_err(|_| DomainError::Validation(format!("invalid total_amount '{}'", amount_raw)))?;

        Ok(VerifiedCallback {
            merchant_order_id: required(FIELD_MERCHANT_ORDER_ID)?.to_string(),
            external_reference: required(FIELD_EXTERNAL_REFERENCE)?.to_string(),
            status,
            amount,
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
