//! Transport error types.

use crate::error::ErrorKind;
use crate::registry::domain::ServerId;
use std::sync::Arc;
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while exchanging messages with a worker.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// No connection is attached for the server.
    #[error("no transport connection for server {0}")]
    NotConnected(ServerId),

    /// The worker did not answer within the bound.
    #[error("server {server_id} did not respond within {timeout_ms} ms")]
    Timeout {
        /// Server identifier.
        server_id: ServerId,
        /// Bound that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The worker closed its end of the channel.
    #[error("connection to server {0} closed")]
    ConnectionClosed(ServerId),

    /// The link kind cannot be used by this transport.
    #[error("unsupported link for server {server_id}: {reason}")]
    UnsupportedLink {
        /// Server identifier.
        server_id: ServerId,
        /// Reason string.
        reason: String,
    },

    /// The worker answered with something that is not a valid reply.
    #[error("malformed response from server {server_id}: {reason}")]
    MalformedResponse {
        /// Server identifier.
        server_id: ServerId,
        /// Parser or protocol message.
        reason: String,
    },

    /// The worker returned a JSON-RPC error object.
    #[error("server {server_id} returned error {code}: {message}")]
    Remote {
        /// Server identifier.
        server_id: ServerId,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// Reading from or writing to the channel failed.
    #[error("transport I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// HTTP client failure.
    #[error("HTTP transport error: {0}")]
    Http(Arc<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wraps an I/O failure.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }

    /// Wraps an HTTP client failure.
    pub fn http(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Http(Arc::new(err))
    }

    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        if self.is_timeout() {
            ErrorKind::TransportTimeout
        } else {
            ErrorKind::TransportError
        }
    }

    /// Returns whether the failure is an elapsed timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
