//! Adapter implementations for the discovery port.

mod manifest;
mod memory;

pub use manifest::{DEFAULT_MANIFEST_FILE, ManifestDirectorySource, ServerManifest};
pub use memory::StaticDefinitionSource;
