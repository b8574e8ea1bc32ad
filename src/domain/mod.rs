//! Domain layer: entities, invariants and repository contracts.

/// `as_str` / `parse` / `Display` for fieldless enums persisted as text.
macro_rules! str_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($s => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod order;
pub mod ports;
pub mod rate;
pub mod repositories;
pub mod session;
pub mod settlement;
pub mod wallet;

pub use order::{Order, OrderStatus, OrderType, PaidTransition, PaymentMethod};
pub use rate::Rate;
pub use repositories::{DomainResult, RepositoryProvider};
pub use session::{
    ChargingSession, ChargingTargets, EnergyReading, MeterReading, PaymentStatus, SessionClosing,
    SessionStatus, StopReason,
};
pub use settlement::SettlementReceipt;
pub use wallet::{EntryType, LedgerPosting, Wallet, WalletTransaction};

pub use crate::shared::errors::DomainError;
