//! Call history adapters.

mod memory;

pub use memory::InMemoryCallHistory;
