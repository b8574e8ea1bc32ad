use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Charger {0} already has an active session")]
    ChargerBusy(String),

    #[error("User {0} already has an active session on another charger")]
    UserAlreadyCharging(String),

    #[error("Session {session_id} is {actual}; cannot {operation}")]
    InvalidState {
        session_id: String,
        actual: String,
        operation: &'static str,
    },

    #[error("Order {order_id} is {actual}; cannot {operation}")]
    InvalidOrderState {
        order_id: String,
        actual: String,
        operation: &'static str,
    },

    #[error("Session {0} is already settled")]
    AlreadySettled(String),

    #[error("Insufficient balance for user {user_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        user_id: String,
        balance: Decimal,
        required: Decimal,
    },

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Invalid callback signature")]
    InvalidSignature,

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Coarse error classes used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InsufficientBalance,
    ExternalGateway,
    InvalidSignature,
    Internal,
}

impl DomainError {
    pub fn not_found(entity: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            field,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidAmount(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ChargerBusy(_)
            | Self::UserAlreadyCharging(_)
            | Self::InvalidState { .. }
            | Self::InvalidOrderState { .. }
            | Self::AlreadySettled(_) => ErrorKind::Conflict,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::Gateway(_) => ErrorKind::ExternalGateway,
            Self::InvalidSignature => ErrorKind::InvalidSignature,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Whether the operation may succeed if retried unchanged
    /// (e.g. a dropped database connection).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<InfraError> for DomainError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Http(e) => DomainError::Gateway(e.to_string()),
            other => DomainError::Storage(other.to_string()),
        }
    }
}
