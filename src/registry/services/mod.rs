//! Shared registry service.

mod registry;

pub(crate) use registry::EntrySlot;
pub use registry::{
    DiscoveryReport, InsertOutcome, RegistryError, RegistryResult, ServerRegistry,
};
