//! Worker host port: creating, signalling and reaping worker processes.

use crate::registry::domain::{ServerDefinition, ServerId};
use crate::transport::ports::WorkerLink;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for worker host operations.
pub type WorkerHostResult<T> = Result<T, WorkerHostError>;

/// A process the host has just created.
#[derive(Debug)]
pub struct SpawnedWorker {
    /// OS process id.
    pub pid: u32,
    /// Channel for the transport to attach to.
    pub link: WorkerLink,
}

/// Exit observed for a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code; `128 + signal` for signal deaths where known.
    pub code: Option<i32>,
}

impl WorkerExit {
    /// Creates an exit record.
    #[must_use]
    pub const fn new(code: Option<i32>) -> Self {
        Self { code }
    }
}

/// OS process control for workers, keyed by server id.
///
/// Hosts own process handles between `spawn` and the moment an exit is
/// reaped, so no handle outlives its process.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Creates the process described by the definition.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerHostError::SpawnFailed`] when the OS refuses to create
    /// the process.
    async fn spawn(&self, definition: &ServerDefinition) -> WorkerHostResult<SpawnedWorker>;

    /// Requests graceful termination, force-killing after `grace`, and
    /// waits for the exit.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerHostError::NotRunning`] when the host holds no process
    /// for the server.
    async fn terminate(&self, server_id: &ServerId, grace: Duration)
    -> WorkerHostResult<WorkerExit>;

    /// Force-kills the process and waits for the exit.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerHostError::NotRunning`] when the host holds no process
    /// for the server.
    async fn kill(&self, server_id: &ServerId) -> WorkerHostResult<WorkerExit>;

    /// Reaps the process if it has exited, without blocking.
    ///
    /// Returns `None` while the process is alive. A server the host holds
    /// no process for is reported as exited with an unknown code.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerHostError::Runtime`] when the status query fails.
    async fn poll_exit(&self, server_id: &ServerId) -> WorkerHostResult<Option<WorkerExit>>;
}

/// Errors returned by worker host adapters.
#[derive(Debug, Clone, Error)]
pub enum WorkerHostError {
    /// The process could not be created.
    #[error("cannot spawn {executable} for server {server_id}: {source}")]
    SpawnFailed {
        /// Server identifier.
        server_id: ServerId,
        /// Executable that failed to launch.
        executable: Utf8PathBuf,
        /// Underlying OS error.
        source: Arc<std::io::Error>,
    },

    /// No process is held for the server.
    #[error("no process for server {0}")]
    NotRunning(ServerId),

    /// Generic runtime failure.
    #[error("worker host runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl WorkerHostError {
    /// Wraps an OS spawn failure for a definition.
    #[must_use]
    pub fn spawn_failed(definition: &ServerDefinition, err: std::io::Error) -> Self {
        Self::SpawnFailed {
            server_id: definition.id().clone(),
            executable: definition.executable_path().to_owned(),
            source: Arc::new(err),
        }
    }

    /// Wraps a runtime error from the host adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}
