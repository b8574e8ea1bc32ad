//! HTTP REST API interfaces
//!
//! - `common`: response envelope, error mapping and caller identity
//! - `modules`: per-resource DTOs and handlers
//! - `router`: route table and shared state

pub mod common;
pub mod modules;
pub mod router;

pub use router::{create_api_router, ApiState};
