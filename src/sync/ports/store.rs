//! Storage of client configuration files.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Result type for configuration store operations.
pub type ConfigStoreResult<T> = Result<T, ConfigStoreError>;

/// Reads and atomically replaces client configuration files.
///
/// Files are never held open between calls.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the file content, or `None` when the file does not exist.
    async fn read(&self, path: &Utf8Path) -> ConfigStoreResult<Option<String>>;

    /// Replaces the file so that readers see either the old or the new
    /// content, never a mixture.
    ///
    /// When `backup` is given and the file exists, its pre-write content is
    /// copied there before the replacement becomes visible.
    async fn replace(&self, path: &Utf8Path, contents: &str, backup: Option<&Utf8Path>) -> ConfigStoreResult<()>;
}

/// Errors returned by configuration store adapters.
#[derive(Debug, Clone, Error)]
pub enum ConfigStoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: Utf8PathBuf,
        /// Underlying failure.
        source: Arc<std::io::Error>,
    },

    /// The blocking worker running the operation failed.
    #[error("configuration store worker failed: {0}")]
    Worker(Arc<dyn std::error::Error + Send + Sync>),
}

impl ConfigStoreError {
    /// Wraps an I/O failure for a path.
    #[must_use]
    pub fn io(path: &Utf8Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.to_owned(),
            source: Arc::new(err),
        }
    }

    /// Wraps a failure of the blocking worker.
    pub fn worker(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Worker(Arc::new(err))
    }
}
