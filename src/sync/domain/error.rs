//! Error types for synchronisation domain values.

use thiserror::Error;

/// Errors returned while building profiles or editing client documents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncDomainError {
    /// The client identifier is empty after trimming.
    #[error("client id must not be empty")]
    EmptyClientId,

    /// The client identifier contains characters outside `[A-Za-z0-9._-]`.
    #[error("client id '{0}' contains invalid characters")]
    InvalidClientId(String),

    /// A section path is empty or has an empty segment.
    #[error("section path '{0}' is invalid")]
    InvalidSectionPath(String),

    /// A custom client was configured without a section path.
    #[error("client {0} uses the custom kind and needs a section path")]
    MissingSectionPath(String),

    /// The document cannot hold a server-registration section.
    #[error("{0}")]
    CorruptDocument(String),
}

/// Error returned while parsing a client kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown client kind: {0}")]
pub struct ParseClientKindError(pub String);
