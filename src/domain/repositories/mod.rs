//! Repository access for the domain layer
//!
//! Contains:
//! - `RepositoryProvider` — unified access to all per-aggregate repositories
//! - `DomainResult` — standard result type for domain operations

use super::order::OrderRepository;
use super::rate::RateRepository;
use super::session::SessionRepository;
use super::settlement::SettlementStore;
use super::wallet::WalletRepository;
use crate::shared::errors::DomainError;

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

// ── RepositoryProvider ──────────────────────────────────────────

/// Provides access to all domain repositories of one backend.
///
/// Consumers request only the repository they need:
///
/// ```ignore
/// async fn handle(repos: &dyn RepositoryProvider) {
///     let session = repos.sessions().find_by_id("CS01").await?;
///     let orders = repos.orders().find_by_session("CS01").await?;
/// }
/// ```
///
/// `settlement()` is the only way to move an order to `paid`; it commits the
/// order, ledger and session together.
pub trait RepositoryProvider: Send + Sync {
    fn sessions(&self) -> &dyn SessionRepository;
    fn orders(&self) -> &dyn OrderRepository;
    fn wallets(&self) -> &dyn WalletRepository;
    fn rates(&self) -> &dyn RateRepository;
    fn settlement(&self) -> &dyn SettlementStore;
}
