//! Fixed in-memory definition source.

use crate::registry::{
    domain::ServerDefinition,
    ports::{DefinitionSource, DiscoveryResult},
};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

/// Definition source backed by a replaceable in-memory list.
///
/// Suitable for tests and for embedding the control plane where definitions
/// come from somewhere other than the filesystem.
#[derive(Debug, Clone, Default)]
pub struct StaticDefinitionSource {
    definitions: Arc<RwLock<Vec<ServerDefinition>>>,
}

impl StaticDefinitionSource {
    /// Creates a source that reports the given definitions.
    #[must_use]
    pub fn new(definitions: Vec<ServerDefinition>) -> Self {
        Self {
            definitions: Arc::new(RwLock::new(definitions)),
        }
    }

    /// Replaces the reported definitions.
    pub fn replace(&self, definitions: Vec<ServerDefinition>) {
        *self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = definitions;
    }
}

#[async_trait]
impl DefinitionSource for StaticDefinitionSource {
    async fn discover(&self) -> DiscoveryResult<Vec<ServerDefinition>> {
        Ok(self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
