//! Error types for registry domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing or mutating registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryDomainError {
    /// The server identifier is empty after trimming.
    #[error("server id must not be empty")]
    EmptyServerId,

    /// The server identifier contains characters outside `[A-Za-z0-9._-]`.
    #[error(
        "server id '{0}' contains invalid characters (only alphanumerics, '.', '_' and '-' allowed)"
    )]
    InvalidServerId(String),

    /// The server identifier exceeds the 128-character limit.
    #[error("server id exceeds 128 character limit: {0}")]
    ServerIdTooLong(String),

    /// The display name is empty after trimming.
    #[error("display name must not be empty")]
    EmptyDisplayName,

    /// The executable path is empty after trimming.
    #[error("executable path must not be empty")]
    EmptyExecutablePath,

    /// A declared tool name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// The HTTP endpoint does not have an `http://` or `https://` prefix.
    #[error("endpoint '{0}' must start with 'http://' or 'https://'")]
    InvalidEndpoint(String),

    /// Transitioning between two lifecycle states is invalid.
    #[error("invalid server lifecycle transition: {from} -> {to}")]
    InvalidLifecycleTransition {
        /// Current lifecycle state.
        from: String,
        /// Requested target lifecycle state.
        to: String,
    },
}

/// Error returned while parsing a lifecycle state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown server state: {0}")]
pub struct ParseServerStateError(pub String);

/// Error returned while parsing a transport kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown transport kind: {0}")]
pub struct ParseTransportKindError(pub String);
