//! SeaORM implementation of RepositoryProvider

use sea_orm::DatabaseConnection;

use crate::domain::order::OrderRepository;
use crate::domain::rate::RateRepository;
use crate::domain::repositories::RepositoryProvider;
use crate::domain::session::SessionRepository;
use crate::domain::settlement::SettlementStore;
use crate::domain::wallet::WalletRepository;

use super::order_repository::SeaOrmOrderRepository;
use super::rate_repository::SeaOrmRateRepository;
use super::session_repository::SeaOrmSessionRepository;
use super::settlement_store::SeaOrmSettlementStore;
use super::wallet_repository::SeaOrmWalletRepository;

/// Unified repository provider backed by SeaORM.
///
/// Holds one connection pool and exposes per-aggregate repository accessors.
///
/// ```ignore
/// let repos = SeaOrmRepositoryProvider::new(db.clone());
/// let session = repos.sessions().find_by_id("CS01").await?;
/// let receipt = repos.settlement().settle_from_balance("ORD01").await?;
/// ```
pub struct SeaOrmRepositoryProvider {
    sessions: SeaOrmSessionRepository,
    orders: SeaOrmOrderRepository,
    wallets: SeaOrmWalletRepository,
    rates: SeaOrmRateRepository,
    settlement: SeaOrmSettlementStore,
}

impl SeaOrmRepositoryProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            sessions: SeaOrmSessionRepository::new(db.clone()),
            orders: SeaOrmOrderRepository::new(db.clone()),
            wallets: SeaOrmWalletRepository::new(db.clone()),
            rates: SeaOrmRateRepository::new(db.clone()),
            settlement: SeaOrmSettlementStore::new(db),
        }
    }
}

impl RepositoryProvider for SeaOrmRepositoryProvider {
    fn sessions(&self) -> &dyn SessionRepository {
        &self.sessions
    }

    fn orders(&self) -> &dyn OrderRepository {
        &self.orders
    }

    fn wallets(&self) -> &dyn WalletRepository {
        &self.wallets
    }

    fn rates(&self) -> &dyn RateRepository {
        &self.rates
    }

    fn settlement(&self) -> &dyn SettlementStore {
        &self.settlement
    }
}
