//! Capability-scoped filesystem store with staged atomic replacement.
//!
//! A replacement writes the new content to a uniquely named sibling file,
//! flushes it to disk, copies the current file to its backup location, and
//! renames the staged file over the original. The staged file is removed if
//! any step before the rename fails.

use crate::sync::ports::{ConfigStore, ConfigStoreError, ConfigStoreResult};
use async_trait::async_trait;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io::{self, Write};
use tracing::debug;
use uuid::Uuid;

/// Configuration store backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemConfigStore;

impl FilesystemConfigStore {
    /// Creates a filesystem store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn split_path(path: &Utf8Path) -> io::Result<(&Utf8Path, &str)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("path must include a file name"))?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Ok((parent, file_name))
}

fn open_parent_dir(path: &Utf8Path) -> io::Result<(Dir, &str)> {
    let (parent, file_name) = split_path(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

fn create_parent_dir(path: &Utf8Path) -> io::Result<(Dir, &str)> {
    let (parent, file_name) = split_path(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority())?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Sibling file holding new content until it is renamed into place.
struct StagedFile<'dir> {
    dir: &'dir Dir,
    name: String,
    committed: bool,
}

impl<'dir> StagedFile<'dir> {
    fn write(dir: &'dir Dir, target: &str, contents: &str) -> io::Result<Self> {
        let name = format!(".{target}.{}.tmp", Uuid::new_v4().simple());
        let mut file = dir.create(&name)?;
        let staged = Self {
            dir,
            name,
            committed: false,
        };
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);
        Ok(staged)
    }

    fn commit(mut self, target: &str) -> io::Result<()> {
        self.dir.rename(&self.name, self.dir, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile<'_> {
    fn drop(&mut self) {
        if !self.committed
            && let Err(err) = self.dir.remove_file(&self.name)
        {
            debug!(file = %self.name, error = %err, "could not remove staged file");
        }
    }
}

fn copy_to_backup(dir: &Dir, file_name: &str, backup: &Utf8Path) -> io::Result<()> {
    let (backup_dir, backup_name) = create_parent_dir(backup)?;
    match dir.copy(file_name, &backup_dir, backup_name) {
        Ok(_bytes) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn read_blocking(path: &Utf8Path) -> io::Result<Option<String>> {
    let read = open_parent_dir(path).and_then(|(dir, file_name)| dir.read_to_string(file_name));
    match read {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn replace_blocking(path: &Utf8Path, contents: &str, backup: Option<&Utf8Path>) -> io::Result<()> {
    let (dir, file_name) = create_parent_dir(path)?;
    let staged = StagedFile::write(&dir, file_name, contents)?;
    if let Some(backup_path) = backup {
        copy_to_backup(&dir, file_name, backup_path)?;
    }
    staged.commit(file_name)
}

async fn run_blocking<T, F>(path: &Utf8Path, operation: F) -> ConfigStoreResult<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(ConfigStoreError::worker)?
        .map_err(|err| ConfigStoreError::io(path, err))
}

#[async_trait]
impl ConfigStore for FilesystemConfigStore {
    async fn read(&self, path: &Utf8Path) -> ConfigStoreResult<Option<String>> {
        let owned = path.to_owned();
        run_blocking(path, move || read_blocking(&owned)).await
    }

    async fn replace(&self, path: &Utf8Path, contents: &str, backup: Option<&Utf8Path>) -> ConfigStoreResult<()> {
        let owned_path = path.to_owned();
        let owned_contents = contents.to_owned();
        let owned_backup = backup.map(Utf8Path::to_owned);
        run_blocking(path, move || {
            replace_blocking(&owned_path, &owned_contents, owned_backup.as_deref())
        })
        .await
    }
}
