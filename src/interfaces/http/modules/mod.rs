//! Per-resource HTTP modules

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod rates;
pub mod sessions;
pub mod wallets;
