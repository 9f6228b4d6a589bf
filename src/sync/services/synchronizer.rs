//! Client configuration synchroniser service.
//!
//! Each client file has a single writer at a time. A write is computed from
//! a registry snapshot and committed only if the registry revision is still
//! the one the snapshot was taken at; otherwise the attempt is discarded and
//! repeated against fresh state, up to the configured retry bound. The
//! revision is checked again once the file is replaced, and a move during the
//! write triggers another attempt so the file does not settle on a stale
//! snapshot.
//!
//! The synchroniser remembers whether each client's server section existed
//! when it first read the file. Removing the last managed entry drops the
//! section only if it did not.

use crate::error::ErrorKind;
use crate::registry::{
    domain::{RegistrySnapshot, ServerId},
    services::{RegistryError, ServerRegistry},
};
use crate::sync::{
    domain::{
        ClientId, ClientProfile, EmptiedSection, SectionEdit, SyncConfig, SyncDomainError, SyncOutcome,
        SyncSummary, apply_edit, has_section, parse_document, render_document, render_entry,
    },
    ports::{ConfigStore, ConfigStoreError},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Service-level errors for synchronisation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No client is configured under the identifier.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// The server to add is not registered.
    #[error("cannot add server {server_id} to client {client}: server is not registered")]
    UnknownServer {
        /// Client being edited.
        client: ClientId,
        /// Missing server.
        server_id: ServerId,
    },

    /// The file exists but cannot be safely edited; it was left untouched.
    #[error("configuration for client {client} at {path} is corrupt: {reason}")]
    CorruptConfig {
        /// Client being synchronised.
        client: ClientId,
        /// File that failed to parse.
        path: Utf8PathBuf,
        /// Parser or structure message.
        reason: String,
    },

    /// The registry kept changing while the write was being computed.
    #[error("registry changed during every one of {attempts} attempts to sync client {client}")]
    ConcurrentModification {
        /// Client being synchronised.
        client: ClientId,
        /// Attempts made.
        attempts: u32,
    },

    /// Another writer held the client for too long.
    #[error("timed out after {timeout_ms} ms waiting to write client {client}")]
    LockTimeout {
        /// Client being synchronised.
        client: ClientId,
        /// Wait bound in milliseconds.
        timeout_ms: u64,
    },

    /// A read or replace did not finish in time.
    #[error("I/O on {path} did not finish within {timeout_ms} ms")]
    IoTimeout {
        /// File involved.
        path: Utf8PathBuf,
        /// Bound in milliseconds.
        timeout_ms: u64,
    },

    /// No backup exists to restore from.
    #[error("no backup for client {client} at {path}")]
    NoBackup {
        /// Client being restored.
        client: ClientId,
        /// Expected backup location.
        path: Utf8PathBuf,
    },

    /// Reading or writing the file failed.
    #[error(transparent)]
    Store(#[from] ConfigStoreError),

    /// Registry access failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SyncError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownClient(_) => ErrorKind::DefinitionError,
            Self::UnknownServer { .. } => ErrorKind::UnknownServer,
            Self::CorruptConfig { .. } => ErrorKind::ConfigCorruption,
            Self::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            Self::LockTimeout { .. } | Self::IoTimeout { .. } => ErrorKind::TimeoutError,
            Self::NoBackup { .. } | Self::Store(_) => ErrorKind::IoError,
            Self::Registry(err) => err.kind(),
        }
    }
}

/// Result type for synchronisation operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result of synchronising one client as part of a batch.
#[derive(Debug)]
pub struct ClientSyncReport {
    /// Client the result belongs to.
    pub client: ClientId,
    /// Summary on success, or why this client was not synchronised.
    pub result: SyncResult<SyncSummary>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Change requested of a client's section.
#[derive(Debug, Clone)]
enum Delta {
    Reconcile,
    Add(ServerId),
    Remove(ServerId),
}

/// State owned by whoever holds a client's writer lock.
#[derive(Debug, Default)]
struct WriterState {
    /// Whether the section was in the file the first time it was read.
    section_preexisted: Option<bool>,
}

impl WriterState {
    fn emptied_policy(&mut self, document: &serde_json::Value, profile: &ClientProfile) -> EmptiedSection {
        let preexisted = *self
            .section_preexisted
            .get_or_insert_with(|| has_section(document, profile.section()));
        if preexisted {
            EmptiedSection::Keep
        } else {
            EmptiedSection::Drop
        }
    }
}

#[derive(Debug)]
struct ClientSlot {
    profile: ClientProfile,
    writer: Mutex<WriterState>,
}

/// Keeps client configuration files consistent with the registry.
pub struct ClientConfigSynchronizer<S>
where
    S: ConfigStore,
{
    registry: Arc<ServerRegistry>,
    store: Arc<S>,
    clients: BTreeMap<ClientId, Arc<ClientSlot>>,
    config: SyncConfig,
}

impl<S> ClientConfigSynchronizer<S>
where
    S: ConfigStore,
{
    /// Creates a synchroniser for the given clients.
    ///
    /// If two profiles share an id, the later one wins.
    #[must_use]
    pub fn new(
        registry: Arc<ServerRegistry>,
        store: Arc<S>,
        profiles: impl IntoIterator<Item = ClientProfile>,
        config: SyncConfig,
    ) -> Self {
        let clients = profiles
            .into_iter()
            .map(|profile| {
                let slot = ClientSlot {
                    profile,
                    writer: Mutex::new(WriterState::default()),
                };
                (slot.profile.id().clone(), Arc::new(slot))
            })
            .collect();
        Self {
            registry,
            store,
            clients,
            config,
        }
    }

    /// Returns the configured client ids in order.
    #[must_use]
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().cloned().collect()
    }

    /// Returns a client's profile.
    #[must_use]
    pub fn profile(&self, client: &ClientId) -> Option<&ClientProfile> {
        self.clients.get(client).map(|slot| &slot.profile)
    }

    /// Brings one client's server section in line with the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the client is unknown, its file is
    /// corrupt, the registry kept changing, or I/O fails.
    pub async fn sync_client(&self, client: &ClientId) -> SyncResult<SyncSummary> {
        self.run(client, &Delta::Reconcile).await
    }

    /// Adds one registered server to a client if it is not already listed.
    ///
    /// # Errors
    ///
    /// As for [`Self::sync_client`], plus [`SyncError::UnknownServer`].
    pub async fn add_server(&self, client: &ClientId, server_id: &ServerId) -> SyncResult<SyncSummary> {
        self.run(client, &Delta::Add(server_id.clone())).await
    }

    /// Removes one server from a client if it is listed.
    ///
    /// # Errors
    ///
    /// As for [`Self::sync_client`].
    pub async fn remove_server(&self, client: &ClientId, server_id: &ServerId) -> SyncResult<SyncSummary> {
        self.run(client, &Delta::Remove(server_id.clone())).await
    }

    /// Synchronises every configured client, reporting each individually.
    pub async fn sync_all(&self) -> Vec<ClientSyncReport> {
        let mut reports = Vec::with_capacity(self.clients.len());
        for client in self.clients.keys() {
            let result = self.sync_client(client).await;
            if let Err(err) = &result {
                warn!(client = %client, error = %err, "client sync failed");
            }
            reports.push(ClientSyncReport {
                client: client.clone(),
                result,
            });
        }
        reports
    }

    /// Restores a client's file from its backup.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoBackup`] when there is no backup and
    /// [`SyncError::CorruptConfig`] when the backup does not parse.
    pub async fn restore_backup(&self, client: &ClientId) -> SyncResult<SyncSummary> {
        let slot = self.slot(client)?;
        let _writer = self.lock_writer(&slot).await?;
        let profile = &slot.profile;
        let backup = profile.backup_path(self.config.backup_suffix());

        let Some(contents) = self.read(&backup).await? else {
            return Err(SyncError::NoBackup {
                client: client.clone(),
                path: backup,
            });
        };
        parse_document(Some(&contents)).map_err(|err| corrupt(profile.id(), &backup, err))?;
        self.replace(profile.path(), &contents, None).await?;
        info!(client = %client, path = %profile.path(), "client configuration restored from backup");

        Ok(SyncSummary {
            client: client.clone(),
            path: profile.path().to_owned(),
            revision: self.registry.revision(),
            attempts: 1,
            outcome: SyncOutcome::Written { backup: None },
        })
    }

    fn slot(&self, client: &ClientId) -> SyncResult<Arc<ClientSlot>> {
        self.clients
            .get(client)
            .cloned()
            .ok_or_else(|| SyncError::UnknownClient(client.clone()))
    }

    async fn lock_writer<'slot>(
        &self,
        slot: &'slot ClientSlot,
    ) -> SyncResult<tokio::sync::MutexGuard<'slot, WriterState>> {
        let timeout = self.config.lock_timeout();
        tokio::time::timeout(timeout, slot.writer.lock())
            .await
            .map_err(|_elapsed| SyncError::LockTimeout {
                client: slot.profile.id().clone(),
                timeout_ms: millis(timeout),
            })
    }

    async fn read(&self, path: &Utf8Path) -> SyncResult<Option<String>> {
        let timeout = self.config.io_timeout();
        Ok(tokio::time::timeout(timeout, self.store.read(path))
            .await
            .map_err(|_elapsed| SyncError::IoTimeout {
                path: path.to_owned(),
                timeout_ms: millis(timeout),
            })??)
    }

    async fn replace(&self, path: &Utf8Path, contents: &str, backup: Option<&Utf8Path>) -> SyncResult<()> {
        let timeout = self.config.io_timeout();
        Ok(tokio::time::timeout(timeout, self.store.replace(path, contents, backup))
            .await
            .map_err(|_elapsed| SyncError::IoTimeout {
                path: path.to_owned(),
                timeout_ms: millis(timeout),
            })??)
    }

    async fn run(&self, client: &ClientId, delta: &Delta) -> SyncResult<SyncSummary> {
        let slot = self.slot(client)?;
        let mut writer = self.lock_writer(&slot).await?;
        let profile = &slot.profile;
        let attempts = self.config.max_retries().saturating_add(1);
        // Backup location of a write an earlier attempt of this run made.
        let mut earlier_write: Option<Option<Utf8PathBuf>> = None;

        for attempt in 1..=attempts {
            let snapshot = self.registry.snapshot()?;
            let current = self.read(profile.path()).await?;
            let original = parse_document(current.as_deref()).map_err(|err| {
                warn!(client = %client, path = %profile.path(), error = %err, "client configuration is corrupt; not writing");
                corrupt(client, profile.path(), err)
            })?;
            let emptied = writer.emptied_policy(&original, profile);

            let mut document = original.clone();
            let edit = self.edit_for(profile, &snapshot, delta)?;
            apply_edit(&mut document, profile.section(), edit, emptied)
                .map_err(|err| corrupt(client, profile.path(), err))?;

            if self.registry.revision() != snapshot.revision() {
                debug!(client = %client, attempt, "registry changed while computing sync; retrying");
                continue;
            }

            let outcome = if document == original {
                earlier_write
                    .take()
                    .map_or(SyncOutcome::Unchanged, |backup| SyncOutcome::Written { backup })
            } else {
                // Only the first write of a run takes a backup, so the backup
                // holds the file as it was before the sync.
                let (backup, take_backup) = match earlier_write.take() {
                    Some(earlier) => (earlier, false),
                    None => (
                        current
                            .is_some()
                            .then(|| profile.backup_path(self.config.backup_suffix())),
                        true,
                    ),
                };
                let fresh_backup = backup.as_deref().filter(|_| take_backup);
                self.replace(profile.path(), &render_document(&document), fresh_backup)
                    .await?;
                if self.registry.revision() != snapshot.revision() {
                    debug!(client = %client, attempt, "registry changed during write; retrying");
                    earlier_write = Some(backup);
                    continue;
                }
                SyncOutcome::Written { backup }
            };

            match &outcome {
                SyncOutcome::Written { .. } => info!(
                    client = %client,
                    path = %profile.path(),
                    revision = snapshot.revision(),
                    "client configuration written"
                ),
                SyncOutcome::Unchanged => debug!(client = %client, "client configuration already current"),
            }
            return Ok(SyncSummary {
                client: client.clone(),
                path: profile.path().to_owned(),
                revision: snapshot.revision(),
                attempts: attempt,
                outcome,
            });
        }

        warn!(client = %client, attempts, "registry kept changing; client sync abandoned");
        Err(SyncError::ConcurrentModification {
            client: client.clone(),
            attempts,
        })
    }

    fn edit_for(&self, profile: &ClientProfile, snapshot: &RegistrySnapshot, delta: &Delta) -> SyncResult<SectionEdit> {
        let kind = profile.kind();
        match delta {
            Delta::Reconcile => {
                let desired = snapshot
                    .entries()
                    .iter()
                    .map(|entry| (entry.id().to_string(), render_entry(kind, entry.definition())))
                    .collect();
                let retired = self
                    .registry
                    .retired_ids()?
                    .into_iter()
                    .filter(|server_id| snapshot.get(server_id).is_none())
                    .map(|server_id| server_id.to_string())
                    .collect();
                Ok(SectionEdit::Reconcile { desired, retired })
            }
            Delta::Add(server_id) => {
                let entry = snapshot
                    .get(server_id)
                    .ok_or_else(|| SyncError::UnknownServer {
                        client: profile.id().clone(),
                        server_id: server_id.clone(),
                    })?;
                Ok(SectionEdit::Add {
                    key: server_id.to_string(),
                    entry: render_entry(kind, entry.definition()),
                })
            }
            Delta::Remove(server_id) => Ok(SectionEdit::Remove {
                key: server_id.to_string(),
            }),
        }
    }
}

fn corrupt(client: &ClientId, path: &Utf8Path, err: SyncDomainError) -> SyncError {
    SyncError::CorruptConfig {
        client: client.clone(),
        path: path.to_owned(),
        reason: err.to_string(),
    }
}
