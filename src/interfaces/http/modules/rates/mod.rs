//! Station rate lookups. Rates are seeded from configuration; the API is
//! read-only.

pub mod handlers;

pub use handlers::*;
