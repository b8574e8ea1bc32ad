//! In-memory backend

mod memory;

pub use memory::InMemoryStorage;
