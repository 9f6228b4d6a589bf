//! Synchroniser settings.

use std::time::Duration;

/// Default number of retries after a stale registry read.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default suffix appended to a client file's name for its backup.
pub const DEFAULT_BACKUP_SUFFIX: &str = "bak";

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for the client configuration synchroniser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    max_retries: u32,
    backup_suffix: String,
    lock_timeout: Duration,
    io_timeout: Duration,
}

impl SyncConfig {
    /// Sets the retry bound for stale registry reads.
    #[must_use]
    pub const fn with_max_retries(mut self, value: u32) -> Self {
        self.max_retries = value;
        self
    }

    /// Sets the backup file suffix.
    #[must_use]
    pub fn with_backup_suffix(mut self, value: impl Into<String>) -> Self {
        self.backup_suffix = value.into();
        self
    }

    /// Sets the bound on waiting for another writer of the same client.
    #[must_use]
    pub const fn with_lock_timeout(mut self, value: Duration) -> Self {
        self.lock_timeout = value;
        self
    }

    /// Sets the bound on a single read or replace.
    #[must_use]
    pub const fn with_io_timeout(mut self, value: Duration) -> Self {
        self.io_timeout = value;
        self
    }

    /// Returns the retry bound.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the backup suffix.
    #[must_use]
    pub fn backup_suffix(&self) -> &str {
        &self.backup_suffix
    }

    /// Returns the per-client lock bound.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Returns the I/O bound.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        self.io_timeout
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_owned(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}
