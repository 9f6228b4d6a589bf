//! Configuration store adapters.

mod filesystem;
mod memory;

pub use filesystem::FilesystemConfigStore;
pub use memory::InMemoryConfigStore;
