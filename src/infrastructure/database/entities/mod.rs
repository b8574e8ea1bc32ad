//! Database entities module
//!
//! Money columns hold minor units (cents), energy columns hold Wh. Per-kWh
//! fees keep their full precision as decimal text.

pub mod charging_session;
pub mod order;
pub mod rate;
pub mod wallet;
pub mod wallet_transaction;

pub use charging_session::Entity as ChargingSession;
pub use order::Entity as Order;
pub use rate::Entity as Rate;
pub use wallet::Entity as Wallet;
pub use wallet_transaction::Entity as WalletTransaction;
