//! Charging session aggregate
//!
//! One physical charging event: lifecycle, energy and the frozen cost.

pub mod model;
pub mod repository;

pub use model::{
    ChargingSession, ChargingTargets, EnergyReading, MeterReading, PaymentStatus, SessionClosing,
    SessionStatus, StopReason,
};
pub use repository::SessionRepository;
