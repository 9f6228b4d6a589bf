//! Transport client port.

use crate::registry::domain::ServerId;
use crate::transport::domain::{CallEnvelope, CallResponse, TransportResult};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Byte streams connected to a worker's standard input and output.
pub struct StdioPipes {
    /// Stream written to the worker's stdin.
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Stream read from the worker's stdout.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl StdioPipes {
    /// Bundles a writer and a reader.
    pub fn new(
        writer: impl AsyncWrite + Send + Unpin + 'static,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            writer: Box::new(writer),
            reader: Box::new(reader),
        }
    }
}

impl fmt::Debug for StdioPipes {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("StdioPipes").finish_non_exhaustive()
    }
}

/// Channel a freshly spawned worker exposes to the transport.
#[derive(Debug)]
pub enum WorkerLink {
    /// Line-delimited JSON-RPC over the child's standard streams.
    Stdio(StdioPipes),
    /// JSON-RPC over HTTP to the declared endpoint.
    Http {
        /// Endpoint URL.
        endpoint: String,
    },
    /// The host exposes no channel; only simulated transports accept it.
    Detached,
}

/// Request/response exchange with workers.
///
/// Implementations hold one connection per server id between `attach` and
/// `detach`. Every call is bounded by the supplied timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Binds a connection for the server, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the link cannot be used.
    async fn attach(&self, server_id: &ServerId, link: WorkerLink) -> TransportResult<()>;

    /// Performs the readiness handshake.
    ///
    /// # Errors
    ///
    /// Returns a transport error, including a timeout, when the worker does
    /// not complete the handshake.
    async fn handshake(&self, server_id: &ServerId, timeout: Duration) -> TransportResult<()>;

    /// Sends a liveness probe.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the worker does not answer.
    async fn ping(&self, server_id: &ServerId, timeout: Duration) -> TransportResult<()>;

    /// Dispatches a tool call and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns a transport error when dispatch or the response fails.
    async fn send(
        &self,
        server_id: &ServerId,
        envelope: &CallEnvelope,
        timeout: Duration,
    ) -> TransportResult<CallResponse>;

    /// Drops the connection for the server, if any.
    async fn detach(&self, server_id: &ServerId);
}
