//! Router settings.

use std::time::Duration;

/// Default bound on one tool call round trip.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of call records retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Settings for the tool execution router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    call_timeout: Duration,
}

impl RouterConfig {
    /// Creates settings with the given call bound.
    #[must_use]
    pub const fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    /// Returns the call bound.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}
