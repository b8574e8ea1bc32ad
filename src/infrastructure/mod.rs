//! Infrastructure layer - external concerns

pub mod database;
pub mod gateway;
pub mod storage;

pub use database::{init_database, DatabaseConfig, SeaOrmRepositoryProvider};
pub use gateway::{GatewayConfig, HttpGateway, SandboxGateway};
pub use storage::InMemoryStorage;
