//! Discovery port producing server definitions.

use crate::error::ErrorKind;
use crate::registry::domain::{RegistryDomainError, ServerDefinition};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Source of server definitions, typically a filesystem scan.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Returns every definition currently visible to the source.
    ///
    /// Individual malformed definitions are skipped by implementations and
    /// reported through logging; only failures that prevent scanning at all
    /// are returned as errors.
    async fn discover(&self) -> DiscoveryResult<Vec<ServerDefinition>>;
}

/// Errors returned by discovery adapters.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// The scan root could not be read.
    #[error("cannot scan {path}: {source}")]
    Unreadable {
        /// Directory that failed to scan.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        source: Arc<std::io::Error>,
    },

    /// A manifest was syntactically valid but described an invalid server.
    #[error("invalid server definition in {path}: {source}")]
    InvalidDefinition {
        /// Manifest location.
        path: Utf8PathBuf,
        /// Domain validation failure.
        source: RegistryDomainError,
    },

    /// A manifest could not be parsed.
    #[error("malformed manifest {path}: {reason}")]
    MalformedManifest {
        /// Manifest location.
        path: Utf8PathBuf,
        /// Parser message.
        reason: String,
    },
}

impl DiscoveryError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreadable { .. } => ErrorKind::IoError,
            Self::InvalidDefinition { .. } | Self::MalformedManifest { .. } => {
                ErrorKind::DefinitionError
            }
        }
    }
}
