//! Liveness check results.

use serde::Serialize;

/// What one liveness check observed and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessOutcome {
    /// The process is alive and answered the probe.
    Healthy,
    /// A degraded server answered again and is back to running.
    Recovered,
    /// The process is alive but did not answer the probe.
    Degraded,
    /// The process exited unexpectedly.
    Crashed {
        /// Whether an automatic restart brought it back to running.
        restarted: bool,
    },
    /// Nothing to check: no live process, or another lifecycle operation
    /// holds the server.
    Skipped,
}
