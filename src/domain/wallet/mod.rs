//! Wallet aggregate
//!
//! Prepaid balance per user, mutated only by appending ledger entries.

pub mod model;
pub mod repository;

pub use model::{EntryType, LedgerPosting, Wallet, WalletTransaction};
pub use repository::WalletRepository;
