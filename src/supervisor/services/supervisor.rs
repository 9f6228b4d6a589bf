//! Process supervisor service.
//!
//! Start and stop for one server id are serialised through the registry's
//! per-server lifecycle lock; different ids proceed concurrently. Every
//! wait is bounded by a configured timeout.

use crate::error::ErrorKind;
use crate::registry::{
    domain::{RegistryEntry, SYNTHETIC_TIMEOUT_EXIT_CODE, ServerId, ServerState},
    services::{EntrySlot, RegistryError, ServerRegistry},
};
use crate::supervisor::{
    domain::{LivenessOutcome, SupervisorConfig},
    ports::{WorkerHost, WorkerHostError},
};
use crate::transport::{domain::TransportError, ports::TransportClient};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::MutexGuard;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Service-level errors for supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Registry lookup or update failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The server is not in a state that allows starting.
    #[error("server {server_id} cannot start while {state}")]
    NotStartable {
        /// Server identifier.
        server_id: ServerId,
        /// Current lifecycle state.
        state: ServerState,
    },

    /// The OS failed to create the process; state is unchanged.
    #[error("server {server_id} failed to spawn: {source}")]
    Spawn {
        /// Server identifier.
        server_id: ServerId,
        /// Host failure.
        source: WorkerHostError,
    },

    /// The process did not become ready in time and was killed.
    #[error("server {server_id} did not become ready within {timeout_ms} ms")]
    StartTimeout {
        /// Server identifier.
        server_id: ServerId,
        /// Readiness bound in milliseconds.
        timeout_ms: u64,
    },

    /// The readiness handshake failed and the process was killed.
    #[error("server {server_id} failed its readiness handshake: {source}")]
    Handshake {
        /// Server identifier.
        server_id: ServerId,
        /// Transport failure.
        source: TransportError,
    },

    /// Another lifecycle operation held the server for too long.
    #[error("timed out after {timeout_ms} ms waiting for a lifecycle operation on server {server_id}")]
    LockTimeout {
        /// Server identifier.
        server_id: ServerId,
        /// Wait bound in milliseconds.
        timeout_ms: u64,
    },

    /// Process control failed.
    #[error(transparent)]
    Host(#[from] WorkerHostError),
}

impl SupervisorError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Registry(err) => err.kind(),
            Self::NotStartable { .. } => ErrorKind::LifecycleError,
            Self::Spawn { .. } => ErrorKind::SpawnError,
            Self::StartTimeout { .. } | Self::LockTimeout { .. } => ErrorKind::TimeoutError,
            Self::Handshake { .. } => ErrorKind::TransportError,
            Self::Host(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Owns the lifecycle of every worker process.
///
/// This is the only component that writes runtime records into the
/// registry.
pub struct ProcessSupervisor<H, T, C>
where
    H: WorkerHost,
    T: TransportClient,
    C: Clock + Send + Sync,
{
    registry: Arc<ServerRegistry>,
    host: Arc<H>,
    transport: Arc<T>,
    clock: Arc<C>,
    config: SupervisorConfig,
}

impl<H, T, C> ProcessSupervisor<H, T, C>
where
    H: WorkerHost,
    T: TransportClient,
    C: Clock + Send + Sync,
{
    /// Creates a supervisor.
    #[must_use]
    pub const fn new(
        registry: Arc<ServerRegistry>,
        host: Arc<H>,
        transport: Arc<T>,
        clock: Arc<C>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            registry,
            host,
            transport,
            clock,
            config,
        }
    }

    /// Returns the supervisor settings.
    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Returns a copy of the server's current entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown ids.
    pub fn status(&self, server_id: &ServerId) -> SupervisorResult<RegistryEntry> {
        self.registry
            .get(server_id)?
            .ok_or_else(|| RegistryError::NotFound(server_id.clone()).into())
    }

    async fn acquire<'slot>(
        &self,
        slot: &'slot EntrySlot,
        server_id: &ServerId,
    ) -> SupervisorResult<MutexGuard<'slot, ()>> {
        let bound = self.config.lock_timeout();
        tokio::time::timeout(bound, slot.lock_lifecycle())
            .await
            .map_err(|_| SupervisorError::LockTimeout {
                server_id: server_id.clone(),
                timeout_ms: millis(bound),
            })
    }

    /// Spawns the server's process and waits for readiness.
    ///
    /// A spawn failure leaves the state untouched. A worker that fails to
    /// become ready within the start timeout is killed and recorded as
    /// `crashed` with exit code [`SYNTHETIC_TIMEOUT_EXIT_CODE`].
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotStartable`] unless the server is
    /// `stopped` or `crashed`, [`SupervisorError::Spawn`] when the process
    /// cannot be created, and [`SupervisorError::StartTimeout`] or
    /// [`SupervisorError::Handshake`] when readiness fails.
    pub async fn start(&self, server_id: &ServerId) -> SupervisorResult<RegistryEntry> {
        let slot = self.registry.slot(server_id)?;
        let _lifecycle = self.acquire(&slot, server_id).await?;
        self.start_locked(server_id).await
    }

    async fn start_locked(&self, server_id: &ServerId) -> SupervisorResult<RegistryEntry> {
        let entry = self.status(server_id)?;
        if !entry.state().can_start() {
            return Err(SupervisorError::NotStartable {
                server_id: server_id.clone(),
                state: entry.state(),
            });
        }

        let spawned = self
            .host
            .spawn(entry.definition())
            .await
            .map_err(|source| {
                warn!(server_id = %server_id, error = %source, "worker spawn failed");
                SupervisorError::Spawn {
                    server_id: server_id.clone(),
                    source,
                }
            })?;
        let pid = spawned.pid;
        if let Err(err) = self
            .registry
            .update_runtime(server_id, |runtime| runtime.mark_starting(pid, &*self.clock))
        {
            self.discard_process(server_id).await;
            return Err(err.into());
        }
        info!(server_id = %server_id, pid, "worker spawned; awaiting readiness");

        let bound = self.config.start_timeout();
        let readiness = tokio::time::timeout(bound, async {
            self.transport.attach(server_id, spawned.link).await?;
            self.transport.handshake(server_id, bound).await
        })
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::Timeout {
                server_id: server_id.clone(),
                timeout_ms: millis(bound),
            })
        });

        match readiness {
            Ok(()) => {
                self.registry
                    .update_runtime(server_id, |runtime| runtime.mark_running(&*self.clock))?;
                info!(server_id = %server_id, pid, "server running");
                self.status(server_id)
            }
            Err(source) if source.is_timeout() => {
                self.discard_process(server_id).await;
                let reason = format!("not ready within {} ms", millis(bound));
                self.registry.update_runtime(server_id, |runtime| {
                    runtime.mark_crashed(Some(SYNTHETIC_TIMEOUT_EXIT_CODE), reason, &*self.clock)
                })?;
                warn!(server_id = %server_id, timeout_ms = millis(bound), "start timed out; worker killed");
                Err(SupervisorError::StartTimeout {
                    server_id: server_id.clone(),
                    timeout_ms: millis(bound),
                })
            }
            Err(source) => {
                let exit_code = self.discard_process(server_id).await;
                let reason = format!("readiness handshake failed: {source}");
                self.registry.update_runtime(server_id, |runtime| {
                    runtime.mark_crashed(exit_code, reason, &*self.clock)
                })?;
                warn!(server_id = %server_id, error = %source, "handshake failed; worker killed");
                Err(SupervisorError::Handshake {
                    server_id: server_id.clone(),
                    source,
                })
            }
        }
    }

    /// Releases the transport link and force-kills any process the host
    /// still holds, returning its exit code.
    async fn discard_process(&self, server_id: &ServerId) -> Option<i32> {
        self.transport.detach(server_id).await;
        match self.host.kill(server_id).await {
            Ok(exit) => exit.code,
            Err(WorkerHostError::NotRunning(_)) => None,
            Err(err) => {
                error!(server_id = %server_id, error = %err, "failed to kill worker");
                None
            }
        }
    }

    /// Terminates the server's process and waits for its exit.
    ///
    /// Stopping a `stopped` server succeeds without side effects. Stopping
    /// a `crashed` server acknowledges the crash and moves it to `stopped`.
    /// The transport link is always released before the process is
    /// signalled.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown ids,
    /// [`SupervisorError::LockTimeout`] when another operation holds the
    /// server too long, and [`SupervisorError::Host`] when process control
    /// fails; the server then stays `stopping` and `stop` may be retried.
    pub async fn stop(&self, server_id: &ServerId) -> SupervisorResult<RegistryEntry> {
        let slot = self.registry.slot(server_id)?;
        let _lifecycle = self.acquire(&slot, server_id).await?;
        self.stop_locked(server_id).await
    }

    async fn stop_locked(&self, server_id: &ServerId) -> SupervisorResult<RegistryEntry> {
        let entry = self.status(server_id)?;
        match entry.state() {
            ServerState::Stopped => {
                debug!(server_id = %server_id, "server already stopped");
                return Ok(entry);
            }
            ServerState::Crashed => {
                self.discard_process(server_id).await;
                self.registry
                    .update_runtime(server_id, |runtime| runtime.mark_stopped(None, &*self.clock))?;
                info!(server_id = %server_id, "crash acknowledged; server stopped");
                return self.status(server_id);
            }
            ServerState::Stopping => {}
            ServerState::Starting | ServerState::Running | ServerState::Degraded => {
                self.registry
                    .update_runtime(server_id, |runtime| runtime.mark_stopping(&*self.clock))?;
            }
        }

        self.transport.detach(server_id).await;
        let exit_code = match self
            .host
            .terminate(server_id, self.config.stop_grace())
            .await
        {
            Ok(exit) => exit.code,
            Err(WorkerHostError::NotRunning(_)) => None,
            Err(err) => return Err(err.into()),
        };
        self.registry.update_runtime(server_id, |runtime| {
            runtime.mark_stopped(exit_code, &*self.clock)
        })?;
        info!(server_id = %server_id, exit_code = ?exit_code, "server stopped");
        self.status(server_id)
    }

    /// Checks one server for unexpected exit and probe failures.
    ///
    /// Servers held by another lifecycle operation, or without a running
    /// process, are skipped. An unexpected exit moves the server to
    /// `crashed`, increments its restart count, and restarts it when the
    /// restart policy allows.
    ///
    /// # Errors
    ///
    /// Returns registry errors for unknown ids and host errors when the exit
    /// status cannot be queried.
    pub async fn check_liveness(&self, server_id: &ServerId) -> SupervisorResult<LivenessOutcome> {
        let slot = self.registry.slot(server_id)?;
        let Some(_lifecycle) = slot.try_lock_lifecycle() else {
            return Ok(LivenessOutcome::Skipped);
        };
        let entry = self.status(server_id)?;
        let previous = entry.state();
        if !matches!(previous, ServerState::Running | ServerState::Degraded) {
            return Ok(LivenessOutcome::Skipped);
        }

        if let Some(exit) = self.host.poll_exit(server_id).await? {
            self.transport.detach(server_id).await;
            let restart_count = self.registry.update_runtime(server_id, |runtime| {
                runtime.record_unexpected_exit(exit.code, &*self.clock)?;
                Ok(runtime.restart_count())
            })?;
            warn!(
                server_id = %server_id,
                exit_code = ?exit.code,
                restart_count,
                "worker exited unexpectedly"
            );
            if !self.config.restart_policy().allows_restart(restart_count) {
                return Ok(LivenessOutcome::Crashed { restarted: false });
            }

            info!(server_id = %server_id, restart_count, "restarting crashed server");
            let restarted = match self.start_locked(server_id).await {
                Ok(_) => true,
                Err(err) => {
                    warn!(server_id = %server_id, error = %err, "automatic restart failed");
                    false
                }
            };
            return Ok(LivenessOutcome::Crashed { restarted });
        }

        if !self.config.heartbeat_probe() {
            return Ok(LivenessOutcome::Healthy);
        }
        match self
            .transport
            .ping(server_id, self.config.heartbeat_interval())
            .await
        {
            Ok(()) => {
                self.registry
                    .update_runtime(server_id, |runtime| runtime.record_heartbeat(&*self.clock))?;
                if previous == ServerState::Degraded {
                    info!(server_id = %server_id, "server recovered");
                    Ok(LivenessOutcome::Recovered)
                } else {
                    Ok(LivenessOutcome::Healthy)
                }
            }
            Err(err) => {
                let reason = format!("heartbeat failed: {err}");
                self.registry.update_runtime(server_id, |runtime| {
                    runtime.mark_degraded(reason, &*self.clock)
                })?;
                if previous == ServerState::Running {
                    warn!(server_id = %server_id, error = %err, "server degraded");
                }
                Ok(LivenessOutcome::Degraded)
            }
        }
    }

    /// Runs a liveness check for every registered server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when the id list cannot be
    /// read; per-server failures are reported in the result.
    pub async fn check_all(
        &self,
    ) -> SupervisorResult<Vec<(ServerId, SupervisorResult<LivenessOutcome>)>> {
        let mut results = Vec::new();
        for server_id in self.registry.ids()? {
            let outcome = self.check_liveness(&server_id).await;
            results.push((server_id, outcome));
        }
        Ok(results)
    }
}

impl<H, T, C> ProcessSupervisor<H, T, C>
where
    H: WorkerHost + 'static,
    T: TransportClient + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Starts the periodic liveness loop until `shutdown` is cancelled.
    #[must_use]
    pub fn spawn_liveness_loop(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.run_liveness_round().await,
                }
            }
            debug!("liveness loop stopped");
        })
    }

    async fn run_liveness_round(&self) {
        match self.check_all().await {
            Ok(results) => {
                for (server_id, outcome) in results {
                    if let Err(err) = outcome {
                        warn!(server_id = %server_id, error = %err, "liveness check failed");
                    }
                }
            }
            Err(err) => error!(error = %err, "liveness round failed"),
        }
    }

    /// Starts every `stopped` server concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when the registry cannot be
    /// read; per-server failures are reported in the result.
    pub async fn start_all(
        self: Arc<Self>,
    ) -> SupervisorResult<Vec<(ServerId, SupervisorResult<RegistryEntry>)>> {
        let targets = self.ids_in(|state| state == ServerState::Stopped)?;
        Ok(self
            .fan_out(targets, |supervisor, server_id| async move {
                let result = supervisor.start(&server_id).await;
                (server_id, result)
            })
            .await)
    }

    /// Stops every server that is not already `stopped`, concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when the registry cannot be
    /// read; per-server failures are reported in the result.
    pub async fn stop_all(
        self: Arc<Self>,
    ) -> SupervisorResult<Vec<(ServerId, SupervisorResult<RegistryEntry>)>> {
        let targets = self.ids_in(|state| state != ServerState::Stopped)?;
        Ok(self
            .fan_out(targets, |supervisor, server_id| async move {
                let result = supervisor.stop(&server_id).await;
                (server_id, result)
            })
            .await)
    }

    fn ids_in(&self, predicate: impl Fn(ServerState) -> bool) -> SupervisorResult<Vec<ServerId>> {
        Ok(self
            .registry
            .snapshot()?
            .entries()
            .iter()
            .filter(|entry| predicate(entry.state()))
            .map(|entry| entry.id().clone())
            .collect())
    }

    async fn fan_out<F, Fut>(
        self: Arc<Self>,
        targets: Vec<ServerId>,
        operation: F,
    ) -> Vec<(ServerId, SupervisorResult<RegistryEntry>)>
    where
        F: Fn(Arc<Self>, ServerId) -> Fut,
        Fut: Future<Output = (ServerId, SupervisorResult<RegistryEntry>)> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for server_id in targets {
            tasks.spawn(operation(Arc::clone(&self), server_id));
        }
        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => error!(error = %err, "lifecycle task failed"),
            }
        }
        results.sort_by(|left, right| left.0.cmp(&right.0));
        results
    }
}
