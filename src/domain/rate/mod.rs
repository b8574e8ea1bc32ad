//! Rate aggregate
//!
//! Per-station energy and service prices.

pub mod model;
pub mod repository;

pub use model::Rate;
pub use repository::RateRepository;
