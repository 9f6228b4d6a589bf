//! Machine-readable error taxonomy shared by every operation group.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No server is registered under the identifier.
    UnknownServer,
    /// The server exists but is not accepting calls.
    ServerNotReady,
    /// The server does not declare the requested tool.
    UnknownTool,
    /// Caller-supplied parameters violate the tool schema.
    ValidationError,
    /// The worker did not answer a call in time.
    TransportTimeout,
    /// The dispatch layer failed.
    TransportError,
    /// The caller cancelled the operation.
    Cancelled,
    /// A server definition is missing or invalid.
    DefinitionError,
    /// The requested lifecycle transition is not allowed.
    LifecycleError,
    /// The OS failed to create the worker process.
    SpawnError,
    /// A start, stop or lock wait exceeded its bound.
    TimeoutError,
    /// A client configuration file does not parse.
    ConfigCorruption,
    /// The registry kept changing while a client file was being written.
    ConcurrentModification,
    /// Filesystem access failed.
    IoError,
    /// An internal invariant was violated.
    Internal,
}

impl ErrorKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownServer => "unknown_server",
            Self::ServerNotReady => "server_not_ready",
            Self::UnknownTool => "unknown_tool",
            Self::ValidationError => "validation_error",
            Self::TransportTimeout => "transport_timeout",
            Self::TransportError => "transport_error",
            Self::Cancelled => "cancelled",
            Self::DefinitionError => "definition_error",
            Self::LifecycleError => "lifecycle_error",
            Self::SpawnError => "spawn_error",
            Self::TimeoutError => "timeout_error",
            Self::ConfigCorruption => "config_corruption",
            Self::ConcurrentModification => "concurrent_modification",
            Self::IoError => "io_error",
            Self::Internal => "internal",
        }
    }

    /// Returns whether retrying the same operation may succeed.
    ///
    /// Structural faults such as unknown ids or invalid parameters never
    /// are.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::TransportTimeout
                | Self::TransportError
                | Self::TimeoutError
                | Self::ConcurrentModification
                | Self::Cancelled
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
