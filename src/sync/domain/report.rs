//! Per-client synchronisation results.

use super::ClientId;
use camino::Utf8PathBuf;
use serde::Serialize;

/// What a synchronisation did to the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SyncOutcome {
    /// The file was atomically replaced.
    Written {
        /// Copy of the pre-write content, when the file existed before.
        backup: Option<Utf8PathBuf>,
    },
    /// The file already matched; nothing was written.
    Unchanged,
}

/// Successful synchronisation of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Client that was synchronised.
    pub client: ClientId,
    /// File that was examined.
    pub path: Utf8PathBuf,
    /// Registry revision the file now reflects.
    pub revision: u64,
    /// Number of read-compute-write attempts used.
    pub attempts: u32,
    /// What happened to the file.
    pub outcome: SyncOutcome,
}
