//! Synchronisation services.

mod synchronizer;

pub use synchronizer::{ClientConfigSynchronizer, ClientSyncReport, SyncError, SyncResult};
