//! In-memory configuration store for tests and embedding.

use crate::sync::ports::{ConfigStore, ConfigStoreError, ConfigStoreResult};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct InMemoryStoreState {
    files: BTreeMap<Utf8PathBuf, String>,
    replacements: usize,
    failing: BTreeSet<Utf8PathBuf>,
}

/// Configuration store holding files in a map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    state: Arc<RwLock<InMemoryStoreState>>,
}

impl InMemoryConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write_state<T>(&self, apply: impl FnOnce(&mut InMemoryStoreState) -> T) -> T {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state)
    }

    fn read_state<T>(&self, inspect: impl FnOnce(&InMemoryStoreState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        inspect(&state)
    }

    /// Seeds a file.
    pub fn insert(&self, path: impl Into<Utf8PathBuf>, contents: impl Into<String>) {
        let (key, value) = (path.into(), contents.into());
        self.write_state(|state| {
            state.files.insert(key, value);
        });
    }

    /// Returns a file's content.
    #[must_use]
    pub fn contents(&self, path: &Utf8Path) -> Option<String> {
        self.read_state(|state| state.files.get(path).cloned())
    }

    /// Returns how many replacements have been committed.
    #[must_use]
    pub fn replacements(&self) -> usize {
        self.read_state(|state| state.replacements)
    }

    /// Makes replacements of a path fail with an I/O error.
    pub fn fail_replaces(&self, path: impl Into<Utf8PathBuf>) {
        let key = path.into();
        self.write_state(|state| {
            state.failing.insert(key);
        });
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn read(&self, path: &Utf8Path) -> ConfigStoreResult<Option<String>> {
        Ok(self.contents(path))
    }

    async fn replace(&self, path: &Utf8Path, contents: &str, backup: Option<&Utf8Path>) -> ConfigStoreResult<()> {
        self.write_state(|state| {
            if state.failing.contains(path) {
                return Err(ConfigStoreError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                ));
            }
            if let Some(backup_path) = backup
                && let Some(previous) = state.files.get(path).cloned()
            {
                state.files.insert(backup_path.to_owned(), previous);
            }
            state.files.insert(path.to_owned(), contents.to_owned());
            state.replacements += 1;
            Ok(())
        })
    }
}
