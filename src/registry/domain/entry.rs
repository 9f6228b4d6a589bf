//! Registry entry snapshots and state-change notifications.

use super::{ServerDefinition, ServerId, ServerRuntime, ServerState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A server definition paired with its runtime record.
///
/// Values handed out by the registry are copies; mutating them has no effect
/// on the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    definition: Arc<ServerDefinition>,
    runtime: ServerRuntime,
}

impl RegistryEntry {
    /// Pairs a definition with a runtime record.
    #[must_use]
    pub fn new(definition: ServerDefinition, runtime: ServerRuntime) -> Self {
        Self {
            definition: Arc::new(definition),
            runtime,
        }
    }

    /// Returns the server identifier.
    #[must_use]
    pub fn id(&self) -> &ServerId {
        self.definition.id()
    }

    /// Returns the discovered definition.
    #[must_use]
    pub fn definition(&self) -> &ServerDefinition {
        &self.definition
    }

    /// Returns the runtime record.
    #[must_use]
    pub const fn runtime(&self) -> &ServerRuntime {
        &self.runtime
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.runtime.state()
    }

    pub(crate) fn replace_definition(&mut self, definition: ServerDefinition) {
        self.definition = Arc::new(definition);
    }

    pub(crate) const fn runtime_mut(&mut self) -> &mut ServerRuntime {
        &mut self.runtime
    }
}

/// Point-in-time copy of the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    revision: u64,
    entries: Vec<RegistryEntry>,
}

impl RegistrySnapshot {
    /// Creates a snapshot; entries are ordered by server id.
    #[must_use]
    pub fn new(revision: u64, mut entries: Vec<RegistryEntry>) -> Self {
        entries.sort_by(|left, right| left.id().cmp(right.id()));
        Self { revision, entries }
    }

    /// Returns the structural revision the snapshot was taken at.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns entries ordered by server id.
    #[must_use]
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Looks up an entry by id.
    #[must_use]
    pub fn get(&self, server_id: &ServerId) -> Option<&RegistryEntry> {
        self.entries
            .binary_search_by(|entry| entry.id().cmp(server_id))
            .ok()
            .and_then(|index| self.entries.get(index))
    }
}

/// Notification emitted whenever a server changes lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    /// Server whose state changed.
    pub server_id: ServerId,
    /// State before the change.
    pub from: ServerState,
    /// State after the change.
    pub to: ServerState,
    /// When the change was recorded.
    pub at: DateTime<Utc>,
}
