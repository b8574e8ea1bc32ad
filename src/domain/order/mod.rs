//! Order aggregate
//!
//! One record per settlement attempt, correlating session, ledger entry and
//! gateway reference.

pub mod model;
pub mod repository;

pub use model::{Order, OrderStatus, OrderType, PaidTransition, PaymentMethod};
pub use repository::OrderRepository;
