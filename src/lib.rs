//! # Charge Settlement
//!
//! Charging-session lifecycle and payment settlement for an EV charging
//! network: cost calculation, a prepaid wallet ledger, order tracking and
//! reconciliation of asynchronous payment-gateway callbacks.
//!
//! ## Architecture
//!
//! - **domain**: entities, state machines and repository contracts
//! - **application**: services (sessions, settlement, wallet, reconciliation)
//! - **infrastructure**: in-memory and SeaORM stores, payment gateways
//! - **interfaces**: REST API
//! - **server**: service wiring and process lifecycle

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use infrastructure::{init_database, DatabaseConfig, InMemoryStorage, SeaOrmRepositoryProvider};

pub use interfaces::http::create_api_router;

pub use application::{create_event_bus, Event, EventBus, SharedEventBus};

pub use server::{AppServices, ServerHandle, ServerOptions, ServiceSettings};
