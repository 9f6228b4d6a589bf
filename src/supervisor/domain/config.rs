//! Restart policy and timing bounds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on reaching readiness after spawn.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait between the termination signal and a forced kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Default interval between liveness checks.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on waiting for another lifecycle operation on the same
/// server.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether and how often crashed servers are restarted automatically.
///
/// There is no default: callers state the policy explicitly.
///
/// `max_restarts` counts automatic restarts, not crashes. A crash first
/// increments the server's restart count, and the server is restarted while
/// that count is at most `max_restarts`. With `max_restarts = 2` the first
/// and second crashes are restarted and the third leaves the server
/// `crashed`. `max_restarts = 0` disables automatic restarts even when
/// `auto_restart` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    auto_restart: bool,
    max_restarts: u32,
}

impl RestartPolicy {
    /// Creates a policy.
    ///
    /// `max_restarts` is the number of automatic restarts permitted over the
    /// life of the control plane for one server; see the type docs for how
    /// it is counted.
    #[must_use]
    pub const fn new(auto_restart: bool, max_restarts: u32) -> Self {
        Self {
            auto_restart,
            max_restarts,
        }
    }

    /// Creates a policy that never restarts automatically.
    #[must_use]
    pub const fn manual() -> Self {
        Self::new(false, 0)
    }

    /// Returns whether automatic restart is enabled.
    #[must_use]
    pub const fn auto_restart(self) -> bool {
        self.auto_restart
    }

    /// Returns the restart ceiling.
    #[must_use]
    pub const fn max_restarts(self) -> u32 {
        self.max_restarts
    }

    /// Returns whether a server that has crashed `restart_count` times,
    /// counting the crash just observed, may be restarted again.
    ///
    /// The ceiling is inclusive: `restart_count <= max_restarts`.
    #[must_use]
    pub const fn allows_restart(self, restart_count: u32) -> bool {
        self.auto_restart && restart_count <= self.max_restarts
    }
}

/// Settings for the process supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    restart_policy: RestartPolicy,
    start_timeout: Duration,
    stop_grace: Duration,
    heartbeat_interval: Duration,
    lock_timeout: Duration,
    heartbeat_probe: bool,
}

impl SupervisorConfig {
    /// Creates settings with default bounds and the given restart policy.
    #[must_use]
    pub const fn new(restart_policy: RestartPolicy) -> Self {
        Self {
            restart_policy,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            heartbeat_probe: true,
        }
    }

    /// Sets the readiness bound.
    #[must_use]
    pub const fn with_start_timeout(mut self, value: Duration) -> Self {
        self.start_timeout = value;
        self
    }

    /// Sets the graceful termination window.
    #[must_use]
    pub const fn with_stop_grace(mut self, value: Duration) -> Self {
        self.stop_grace = value;
        self
    }

    /// Sets the liveness check interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, value: Duration) -> Self {
        self.heartbeat_interval = value;
        self
    }

    /// Sets the bound on waiting for per-server serialisation.
    #[must_use]
    pub const fn with_lock_timeout(mut self, value: Duration) -> Self {
        self.lock_timeout = value;
        self
    }

    /// Enables or disables ping probes during liveness checks.
    #[must_use]
    pub const fn with_heartbeat_probe(mut self, enabled: bool) -> Self {
        self.heartbeat_probe = enabled;
        self
    }

    /// Returns the restart policy.
    #[must_use]
    pub const fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    /// Returns the readiness bound.
    #[must_use]
    pub const fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    /// Returns the graceful termination window.
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    /// Returns the liveness check interval.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Returns the per-server serialisation bound.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Returns whether liveness checks ping workers.
    #[must_use]
    pub const fn heartbeat_probe(&self) -> bool {
        self.heartbeat_probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RestartPolicy::manual(), 1, false)]
    #[case(RestartPolicy::new(true, 2), 1, true)]
    #[case(RestartPolicy::new(true, 2), 2, true)]
    #[case(RestartPolicy::new(true, 2), 3, false)]
    #[case(RestartPolicy::new(false, 5), 1, false)]
    #[case(RestartPolicy::new(true, 0), 1, false)]
    fn restart_ceiling(#[case] policy: RestartPolicy, #[case] count: u32, #[case] allowed: bool) {
        assert_eq!(policy.allows_restart(count), allowed);
    }

    #[rstest]
    fn builders_override_defaults() {
        let config = SupervisorConfig::new(RestartPolicy::manual())
            .with_start_timeout(Duration::from_millis(250))
            .with_heartbeat_probe(false);
        assert_eq!(config.start_timeout(), Duration::from_millis(250));
        assert_eq!(config.stop_grace(), DEFAULT_STOP_GRACE);
        assert!(!config.heartbeat_probe());
    }
}
