//! Worker host adapter implementations.

mod memory;
mod process;

pub use memory::InMemoryWorkerHost;
pub use process::TokioWorkerHost;
