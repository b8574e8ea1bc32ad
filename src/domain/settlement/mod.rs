//! Settlement commit contract
//!
//! A settlement touches the order, the wallet ledger and the session's
//! payment status. Backends commit the three as one atomic unit.

pub mod store;

pub use store::{SettlementReceipt, SettlementStore};
