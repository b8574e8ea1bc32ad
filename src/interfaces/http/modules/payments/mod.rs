//! Payment provider callback endpoint

pub mod handlers;

pub use handlers::*;
