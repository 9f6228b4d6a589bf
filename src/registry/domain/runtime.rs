//! Runtime lifecycle record and state machine.

use super::{ParseServerStateError, RegistryDomainError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code recorded when a worker never became ready within the start
/// timeout and had to be force-killed.
pub const SYNTHETIC_TIMEOUT_EXIT_CODE: i32 = 124;

/// Lifecycle state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// No process exists.
    Stopped,
    /// A process was spawned and is awaiting its readiness signal.
    Starting,
    /// The process is ready and accepts tool calls.
    Running,
    /// The process is alive but failed its latest heartbeat.
    Degraded,
    /// A graceful termination is in progress.
    Stopping,
    /// The process exited unexpectedly or never became ready.
    Crashed,
}

impl ServerState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Stopping => "stopping",
            Self::Crashed => "crashed",
        }
    }

    /// Returns whether the state accepts tool calls.
    #[must_use]
    pub const fn accepts_calls(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns whether an OS process is associated with this state.
    #[must_use]
    pub const fn has_process(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Running | Self::Degraded | Self::Stopping
        )
    }

    /// Returns whether `start` may be requested from this state.
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Stopped | Self::Crashed, Self::Starting)
                | (Self::Starting, Self::Running | Self::Crashed | Self::Stopping)
                | (Self::Running, Self::Degraded)
                | (Self::Degraded, Self::Running)
                | (Self::Running | Self::Degraded, Self::Stopping | Self::Crashed)
                | (Self::Stopping | Self::Crashed, Self::Stopped)
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServerState {
    type Error = ParseServerStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "degraded" => Ok(Self::Degraded),
            "stopping" => Ok(Self::Stopping),
            "crashed" => Ok(Self::Crashed),
            _ => Err(ParseServerStateError(value.to_owned())),
        }
    }
}

/// Mutable lifecycle record of a server.
///
/// One record exists per definition for the life of the control plane, so
/// the restart count survives restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRuntime {
    state: ServerState,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    restart_count: u32,
    last_error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl ServerRuntime {
    /// Creates a record in the `stopped` state.
    #[must_use]
    pub fn new(clock: &impl Clock) -> Self {
        Self {
            state: ServerState::Stopped,
            pid: None,
            started_at: None,
            last_heartbeat_at: None,
            exit_code: None,
            restart_count: 0,
            last_error: None,
            updated_at: clock.utc(),
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the OS process id while a process exists.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns when the server last became ready.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the last successful heartbeat was observed.
    #[must_use]
    pub const fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat_at
    }

    /// Returns the exit code recorded in a terminal state.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Returns how many unexpected exits have been observed.
    #[must_use]
    pub const fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Returns the most recent failure description.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the last mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Records a freshly spawned process awaiting readiness.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::InvalidLifecycleTransition`] unless the
    /// server is `stopped` or `crashed`.
    pub fn mark_starting(&mut self, pid: u32, clock: &impl Clock) -> Result<(), RegistryDomainError> {
        self.transition_to(ServerState::Starting)?;
        self.pid = Some(pid);
        self.exit_code = None;
        self.last_error = None;
        self.touch(clock);
        Ok(())
    }

    /// Records a successful readiness signal.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::InvalidLifecycleTransition`] unless the
    /// server is `starting`.
    pub fn mark_running(&mut self, clock: &impl Clock) -> Result<(), RegistryDomainError> {
        self.transition_to(ServerState::Running)?;
        let now = clock.utc();
        self.started_at = Some(now);
        self.last_heartbeat_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records a successful heartbeat, recovering a degraded server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::InvalidLifecycleTransition`] unless the
    /// server is `running` or `degraded`.
    pub fn record_heartbeat(&mut self, clock: &impl Clock) -> Result<(), RegistryDomainError> {
        if self.state == ServerState::Degraded {
            self.transition_to(ServerState::Running)?;
            self.last_error = None;
        } else if self.state != ServerState::Running {
            return Err(self.invalid_transition(ServerState::Running));
        }
        let now = clock.utc();
        self.last_heartbeat_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed heartbeat from a process that is still alive.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::InvalidLifecycleTransition`] unless the
    /// server is `running` or already `degraded`.
    pub fn mark_degraded(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), RegistryDomainError> {
        if self.state != ServerState::Degraded {
            self.transition_to(ServerState::Degraded)?;
        }
        self.last_error = Some(reason.into());
        self.touch(clock);
        Ok(())
    }

    /// Records that a graceful termination has begun.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::InvalidLifecycleTransition`] unless a
    /// live process is associated with the server.
    pub fn mark_stopping(&mut self, clock: &impl Clock) -> Result<(), RegistryDomainError> {
        self.transition_to(ServerState::Stopping)?;
        self.touch(clock);
        Ok(())
    }

    /// Records that the OS confirmed process exit, or acknowledges a crash.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::InvalidLifecycleTransition`] unless the
    /// server is `stopping` or `crashed`.
    pub fn mark_stopped(
        &mut self,
        exit_code: Option<i32>,
        clock: &impl Clock,
    ) -> Result<(), RegistryDomainError> {
        self.transition_to(ServerState::Stopped)?;
        self.pid = None;
        if exit_code.is_some() {
            self.exit_code = exit_code;
        }
        self.touch(clock);
        Ok(())
    }

    /// Records a failure to become ready or an abnormal exit.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::InvalidLifecycleTransition`] unless a
    /// live process is associated with the server.
    pub fn mark_crashed(
        &mut self,
        exit_code: Option<i32>,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), RegistryDomainError> {
        self.transition_to(ServerState::Crashed)?;
        self.pid = None;
        self.exit_code = exit_code;
        self.last_error = Some(reason.into());
        self.touch(clock);
        Ok(())
    }

    /// Records an unexpected exit detected by liveness monitoring and
    /// increments the restart count.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::InvalidLifecycleTransition`] unless a
    /// live process is associated with the server.
    pub fn record_unexpected_exit(
        &mut self,
        exit_code: Option<i32>,
        clock: &impl Clock,
    ) -> Result<(), RegistryDomainError> {
        let reason = exit_code.map_or_else(
            || "process exited unexpectedly".to_owned(),
            |code| format!("process exited unexpectedly with code {code}"),
        );
        self.mark_crashed(exit_code, reason, clock)?;
        self.restart_count = self.restart_count.saturating_add(1);
        Ok(())
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }

    fn invalid_transition(&self, target: ServerState) -> RegistryDomainError {
        RegistryDomainError::InvalidLifecycleTransition {
            from: self.state.as_str().to_owned(),
            to: target.as_str().to_owned(),
        }
    }

    fn transition_to(&mut self, target: ServerState) -> Result<(), RegistryDomainError> {
        if !self.state.can_transition_to(target) {
            return Err(self.invalid_transition(target));
        }

        self.state = target;
        Ok(())
    }
}
