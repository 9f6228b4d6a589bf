//! In-memory worker host for lifecycle tests.

use crate::registry::domain::{ServerDefinition, ServerId};
use crate::supervisor::ports::{
    SpawnedWorker, WorkerExit, WorkerHost, WorkerHostError, WorkerHostResult,
};
use crate::transport::ports::WorkerLink;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Exit code reported for simulated forced kills.
const KILLED_EXIT_CODE: i32 = 137;

/// First simulated pid handed out.
const FIRST_PID: u32 = 40_000;

/// Worker host adapter that models processes without spawning any.
///
/// Spawned workers expose [`WorkerLink::Detached`], so it pairs with the
/// in-memory transport.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkerHost {
    state: Arc<RwLock<InMemoryHostState>>,
}

#[derive(Debug, Default)]
struct InMemoryHostState {
    issued_pids: u32,
    live: HashMap<ServerId, u32>,
    exited: HashMap<ServerId, Option<i32>>,
    unspawnable: HashSet<ServerId>,
    stubborn: HashSet<ServerId>,
    spawn_count: usize,
}

impl InMemoryWorkerHost {
    /// Creates a host with no processes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write_state<T>(&self, apply: impl FnOnce(&mut InMemoryHostState) -> T) -> T {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state)
    }

    fn read_state<T>(&self, inspect: impl FnOnce(&InMemoryHostState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        inspect(&state)
    }

    /// Makes every spawn for the server fail as if the binary were missing.
    pub fn make_unspawnable(&self, server_id: &ServerId) {
        self.write_state(|state| {
            state.unspawnable.insert(server_id.clone());
        });
    }

    /// Makes the server ignore graceful termination requests.
    pub fn make_stubborn(&self, server_id: &ServerId) {
        self.write_state(|state| {
            state.stubborn.insert(server_id.clone());
        });
    }

    /// Simulates the process exiting on its own.
    ///
    /// Returns `false` when no process is live for the server.
    pub fn crash(&self, server_id: &ServerId, exit_code: Option<i32>) -> bool {
        self.write_state(|state| {
            if state.live.remove(server_id).is_none() {
                return false;
            }
            state.exited.insert(server_id.clone(), exit_code);
            true
        })
    }

    /// Returns whether a simulated process is live for the server.
    #[must_use]
    pub fn is_alive(&self, server_id: &ServerId) -> bool {
        self.read_state(|state| state.live.contains_key(server_id))
    }

    /// Returns how many processes have been spawned.
    #[must_use]
    pub fn spawn_count(&self) -> usize {
        self.read_state(|state| state.spawn_count)
    }

    fn remove_live(&self, server_id: &ServerId) -> WorkerHostResult<bool> {
        self.write_state(|state| {
            if state.live.remove(server_id).is_none() {
                return Err(WorkerHostError::NotRunning(server_id.clone()));
            }
            Ok(state.stubborn.contains(server_id))
        })
    }
}

#[async_trait]
impl WorkerHost for InMemoryWorkerHost {
    async fn spawn(&self, definition: &ServerDefinition) -> WorkerHostResult<SpawnedWorker> {
        let server_id = definition.id();
        let pid = self.write_state(|state| {
            if state.unspawnable.contains(server_id) {
                return Err(WorkerHostError::spawn_failed(
                    definition,
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
            state.issued_pids = state.issued_pids.saturating_add(1);
            let pid = FIRST_PID.saturating_add(state.issued_pids);
            state.live.insert(server_id.clone(), pid);
            state.exited.remove(server_id);
            state.spawn_count = state.spawn_count.saturating_add(1);
            Ok(pid)
        })?;
        Ok(SpawnedWorker {
            pid,
            link: WorkerLink::Detached,
        })
    }

    async fn terminate(
        &self,
        server_id: &ServerId,
        _grace: Duration,
    ) -> WorkerHostResult<WorkerExit> {
        let stubborn = self.remove_live(server_id)?;
        Ok(WorkerExit::new(Some(if stubborn { KILLED_EXIT_CODE } else { 0 })))
    }

    async fn kill(&self, server_id: &ServerId) -> WorkerHostResult<WorkerExit> {
        self.remove_live(server_id)?;
        Ok(WorkerExit::new(Some(KILLED_EXIT_CODE)))
    }

    async fn poll_exit(&self, server_id: &ServerId) -> WorkerHostResult<Option<WorkerExit>> {
        Ok(self.write_state(|state| {
            if state.live.contains_key(server_id) {
                return None;
            }
            Some(WorkerExit::new(state.exited.remove(server_id).flatten()))
        }))
    }
}
