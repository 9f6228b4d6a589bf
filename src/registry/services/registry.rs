//! In-memory server registry with per-entry locking.
//!
//! The map of slots is guarded by a short-lived lock taken exclusively only
//! for structural changes (add, replace, remove). Each slot carries its own
//! entry lock and a lifecycle lock that serialises supervisor operations on
//! that server id, so work on different servers proceeds in parallel.

use crate::error::ErrorKind;
use crate::registry::domain::{
    RegistryDomainError, RegistryEntry, RegistrySnapshot, ServerDefinition, ServerId,
    ServerRuntime, ServerState, StateChange,
};
use mockable::Clock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tracing::{debug, info};

/// Capacity of the state-change broadcast channel.
const STATE_CHANGE_CAPACITY: usize = 256;

/// Errors returned by registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No server is registered under the identifier.
    #[error("server {0} not found")]
    NotFound(ServerId),

    /// The server still has a live process and cannot be removed.
    #[error("server {server_id} is {state}; stop it before removing")]
    ServerActive {
        /// Server identifier.
        server_id: ServerId,
        /// Current lifecycle state.
        state: ServerState,
    },

    /// A lifecycle operation currently holds the server.
    #[error("server {0} is busy with a lifecycle operation")]
    ServerBusy(ServerId),

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] RegistryDomainError),

    /// A registry lock was poisoned by a panicking holder.
    #[error("registry lock poisoned: {0}")]
    LockPoisoned(String),
}

impl RegistryError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::UnknownServer,
            Self::ServerActive { .. }
            | Self::ServerBusy(_)
            | Self::Domain(RegistryDomainError::InvalidLifecycleTransition { .. }) => {
                ErrorKind::LifecycleError
            }
            Self::Domain(_) => ErrorKind::DefinitionError,
            Self::LockPoisoned(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Effect of inserting a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The id was new; a stopped runtime record was created.
    Added,
    /// The id existed with a different definition; runtime state was kept.
    Replaced,
    /// The id existed with an identical definition.
    Unchanged,
}

/// Summary of applying a discovery feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Newly registered ids.
    pub added: Vec<ServerId>,
    /// Ids whose definition was replaced.
    pub replaced: Vec<ServerId>,
    /// Ids whose definition was already current.
    pub unchanged: Vec<ServerId>,
    /// Ids removed because discovery no longer reports them.
    pub pruned: Vec<ServerId>,
}

/// Per-server storage cell.
#[derive(Debug)]
pub(crate) struct EntrySlot {
    lifecycle: Mutex<()>,
    entry: RwLock<RegistryEntry>,
}

impl EntrySlot {
    fn new(entry: RegistryEntry) -> Self {
        Self {
            lifecycle: Mutex::new(()),
            entry: RwLock::new(entry),
        }
    }

    /// Waits for exclusive lifecycle access to this server.
    pub(crate) async fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// Takes lifecycle access only if no other operation holds it.
    pub(crate) fn try_lock_lifecycle(&self) -> Option<MutexGuard<'_, ()>> {
        self.lifecycle.try_lock().ok()
    }

    fn read(&self) -> RegistryResult<RwLockReadGuard<'_, RegistryEntry>> {
        self.entry
            .read()
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))
    }

    fn write(&self) -> RegistryResult<RwLockWriteGuard<'_, RegistryEntry>> {
        self.entry
            .write()
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))
    }
}

/// The control plane's single source of truth for servers.
///
/// Components receive an `Arc<ServerRegistry>` at construction. Runtime
/// records are written only through crate-internal methods used by the
/// process supervisor; everything else reads copies.
#[derive(Debug)]
pub struct ServerRegistry {
    slots: RwLock<HashMap<ServerId, Arc<EntrySlot>>>,
    retired: RwLock<BTreeSet<ServerId>>,
    revision: AtomicU64,
    changes: broadcast::Sender<StateChange>,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerRegistry {
    /// Creates an empty registry at revision zero.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(STATE_CHANGE_CAPACITY);
        Self {
            slots: RwLock::new(HashMap::new()),
            retired: RwLock::new(BTreeSet::new()),
            revision: AtomicU64::new(0),
            changes,
        }
    }

    fn read_slots(&self) -> RegistryResult<RwLockReadGuard<'_, HashMap<ServerId, Arc<EntrySlot>>>> {
        self.slots
            .read()
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))
    }

    fn write_slots(
        &self,
    ) -> RegistryResult<RwLockWriteGuard<'_, HashMap<ServerId, Arc<EntrySlot>>>> {
        self.slots
            .write()
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))
    }

    fn write_retired(&self) -> RegistryResult<RwLockWriteGuard<'_, BTreeSet<ServerId>>> {
        self.retired
            .write()
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))
    }

    fn bump_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the structural revision counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Subscribes to lifecycle state-change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Adds a definition or replaces the stored definition for its id.
    ///
    /// Replacement keeps the runtime record untouched, so a running server
    /// stays running with its new definition.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when a registry lock is
    /// poisoned.
    pub fn insert(
        &self,
        definition: ServerDefinition,
        clock: &impl Clock,
    ) -> RegistryResult<InsertOutcome> {
        let mut slots = self.write_slots()?;
        let server_id = definition.id().clone();

        if let Some(slot) = slots.get(&server_id) {
            let mut entry = slot.write()?;
            if *entry.definition() == definition {
                return Ok(InsertOutcome::Unchanged);
            }
            entry.replace_definition(definition);
            let revision = self.bump_revision();
            debug!(server_id = %server_id, revision, "server definition replaced");
            return Ok(InsertOutcome::Replaced);
        }

        let entry = RegistryEntry::new(definition, ServerRuntime::new(clock));
        slots.insert(server_id.clone(), Arc::new(EntrySlot::new(entry)));
        self.write_retired()?.remove(&server_id);
        let revision = self.bump_revision();
        info!(server_id = %server_id, revision, "server registered");
        Ok(InsertOutcome::Added)
    }

    /// Applies a batch of discovered definitions.
    ///
    /// When `prune_missing` is set, registered ids absent from the batch are
    /// removed if they have no live process; ids with a live process are kept
    /// until they are stopped.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when a registry lock is
    /// poisoned.
    pub fn apply_discovery(
        &self,
        definitions: impl IntoIterator<Item = ServerDefinition>,
        prune_missing: bool,
        clock: &impl Clock,
    ) -> RegistryResult<DiscoveryReport> {
        let mut report = DiscoveryReport::default();
        let mut seen = BTreeSet::new();

        for definition in definitions {
            let server_id = definition.id().clone();
            seen.insert(server_id.clone());
            match self.insert(definition, clock)? {
                InsertOutcome::Added => report.added.push(server_id),
                InsertOutcome::Replaced => report.replaced.push(server_id),
                InsertOutcome::Unchanged => report.unchanged.push(server_id),
            }
        }

        if prune_missing {
            for server_id in self.ids()? {
                if seen.contains(&server_id) {
                    continue;
                }
                match self.remove(&server_id) {
                    Ok(_) => report.pruned.push(server_id),
                    Err(RegistryError::ServerActive { .. } | RegistryError::ServerBusy(_)) => {
                        debug!(server_id = %server_id, "vanished server still active; kept");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(report)
    }

    /// Removes a server that has no live process.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown ids,
    /// [`RegistryError::ServerBusy`] while a lifecycle operation holds the
    /// server, and [`RegistryError::ServerActive`] while a process exists.
    pub fn remove(&self, server_id: &ServerId) -> RegistryResult<ServerDefinition> {
        let mut slots = self.write_slots()?;
        let slot = slots
            .get(server_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(server_id.clone()))?;

        let _lifecycle = slot
            .lifecycle
            .try_lock()
            .map_err(|_| RegistryError::ServerBusy(server_id.clone()))?;
        let definition = {
            let entry = slot.read()?;
            if entry.state().has_process() {
                return Err(RegistryError::ServerActive {
                    server_id: server_id.clone(),
                    state: entry.state(),
                });
            }
            entry.definition().clone()
        };

        slots.remove(server_id);
        self.write_retired()?.insert(server_id.clone());
        let revision = self.bump_revision();
        info!(server_id = %server_id, revision, "server removed");
        Ok(definition)
    }

    /// Returns a copy of one entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when a registry lock is
    /// poisoned.
    pub fn get(&self, server_id: &ServerId) -> RegistryResult<Option<RegistryEntry>> {
        let slot = self.read_slots()?.get(server_id).cloned();
        slot.map(|found| found.read().map(|entry| entry.clone()))
            .transpose()
    }

    /// Returns every registered id in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when a registry lock is
    /// poisoned.
    pub fn ids(&self) -> RegistryResult<Vec<ServerId>> {
        let mut ids: Vec<ServerId> = self.read_slots()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Returns the number of registered servers.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when a registry lock is
    /// poisoned.
    pub fn len(&self) -> RegistryResult<usize> {
        Ok(self.read_slots()?.len())
    }

    /// Returns whether no server is registered.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when a registry lock is
    /// poisoned.
    pub fn is_empty(&self) -> RegistryResult<bool> {
        Ok(self.read_slots()?.is_empty())
    }

    /// Returns a consistent copy of all entries with the revision they
    /// correspond to.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when a registry lock is
    /// poisoned.
    pub fn snapshot(&self) -> RegistryResult<RegistrySnapshot> {
        let slots = self.read_slots()?;
        let revision = self.revision();
        let entries = slots
            .values()
            .map(|slot| slot.read().map(|entry| entry.clone()))
            .collect::<RegistryResult<Vec<_>>>()?;
        Ok(RegistrySnapshot::new(revision, entries))
    }

    /// Returns ids removed from the registry during this process lifetime
    /// and not re-added since.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when a registry lock is
    /// poisoned.
    pub fn retired_ids(&self) -> RegistryResult<BTreeSet<ServerId>> {
        self.retired
            .read()
            .map(|retired| retired.clone())
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))
    }

    pub(crate) fn slot(&self, server_id: &ServerId) -> RegistryResult<Arc<EntrySlot>> {
        self.read_slots()?
            .get(server_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(server_id.clone()))
    }

    /// Applies a runtime mutation to one entry and broadcasts any state
    /// change.
    pub(crate) fn update_runtime<T>(
        &self,
        server_id: &ServerId,
        mutate: impl FnOnce(&mut ServerRuntime) -> Result<T, RegistryDomainError>,
    ) -> RegistryResult<T> {
        let slot = self.slot(server_id)?;
        let (value, change) = {
            let mut entry = slot.write()?;
            let from = entry.state();
            let value = mutate(entry.runtime_mut())?;
            let runtime = entry.runtime();
            let change = (runtime.state() != from).then(|| StateChange {
                server_id: server_id.clone(),
                from,
                to: runtime.state(),
                at: runtime.updated_at(),
            });
            (value, change)
        };

        if let Some(notification) = change {
            debug!(
                server_id = %notification.server_id,
                from = %notification.from,
                to = %notification.to,
                "server state changed"
            );
            // No subscribers is not an error.
            let _receivers = self.changes.send(notification);
        }
        Ok(value)
    }
}
