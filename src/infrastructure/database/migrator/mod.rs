//! Database migrations module

pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_rates;
mod m20250101_000002_create_charging_sessions;
mod m20250101_000003_create_orders;
mod m20250101_000004_create_wallets;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_rates::Migration),
            Box::new(m20250101_000002_create_charging_sessions::Migration),
            Box::new(m20250101_000003_create_orders::Migration),
            Box::new(m20250101_000004_create_wallets::Migration),
        ]
    }
}
