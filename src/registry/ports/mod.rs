//! Port contracts feeding the registry.

mod discovery;

pub use discovery::{DefinitionSource, DiscoveryError, DiscoveryResult};
