//! Database repository implementations
//!
//! Per-aggregate SeaORM repositories + unified RepositoryProvider. Multi-row
//! invariants (one open session per charger/user, one paid order per session,
//! one ledger entry per order) are backed by unique indexes; violations are
//! mapped back to the matching domain error.

pub mod order_repository;
pub mod rate_repository;
pub mod repository_provider;
pub mod session_repository;
pub mod settlement_store;
pub mod wallet_repository;

pub use repository_provider::SeaOrmRepositoryProvider;

use rust_decimal::Decimal;
use sea_orm::{DbErr, SqlErr};

use crate::domain::{DomainError, DomainResult};
use crate::shared::errors::InfraError;

fn db_err(e: DbErr) -> DomainError {
    InfraError::Database(e).into()
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Parse a text column into a domain enum, reporting corrupt rows as storage errors.
fn parse_column<T>(value: &str, column: &'static str, parse: fn(&str) -> Option<T>) -> DomainResult<T> {
    parse(value).ok_or_else(|| DomainError::Storage(format!("unexpected {} value '{}'", column, value)))
}

fn parse_decimal(value: &str, column: &'static str) -> DomainResult<Decimal> {
    value
        .parse()
        .map_err(|_| DomainError::Storage(format!("unexpected {} value '{}'", column, value)))
}
