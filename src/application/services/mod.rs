//! Application services

pub mod cost;
pub mod orders;
pub mod rates;
pub mod reconciliation;
pub mod session;
pub mod settlement;
pub mod sweep;
pub mod wallet;

pub use cost::{CostBreakdown, CostCalculator, DEFAULT_ESTIMATED_POWER_KW};
pub use orders::OrderRegistry;
pub use rates::RateTable;
pub use reconciliation::{
    CallbackAck, CallbackEffect, ReconciliationEngine, RechargeStarted, RejectReason, SweepReport,
};
pub use session::{SessionClosed, SessionService, StartSession};
pub use settlement::{SettlementOutcome, SettlementService};
pub use sweep::{SweepConfig, SweepWorker};
pub use wallet::{LedgerAudit, WalletLedger};
