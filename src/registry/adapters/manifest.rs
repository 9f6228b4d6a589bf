//! Filesystem discovery of server manifests.
//!
//! Each immediate subdirectory of the scan root that contains a manifest
//! file describes one server:
//!
//! ```text
//! servers/
//!   filesystem/server.json
//!   github/server.json
//! ```

use crate::registry::{
    domain::{RegistryDomainError, ServerDefinition, ServerId, ToolSpec, TransportKind},
    ports::{DefinitionSource, DiscoveryError, DiscoveryResult},
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Manifest file name looked up in each server directory by default.
pub const DEFAULT_MANIFEST_FILE: &str = "server.json";

/// On-disk manifest describing one server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerManifest {
    /// Explicit identifier; derived from the directory path when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable name.
    pub name: String,
    /// Executable, absolute or relative to the manifest directory.
    pub command: String,
    /// Ordered launch arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables for the process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Transport kind; `stdio` when absent.
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// Endpoint for `http` workers.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Declared tools keyed by name.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolSpec>,
}

const fn default_transport() -> TransportKind {
    TransportKind::Stdio
}

impl ServerManifest {
    /// Converts the manifest found in `server_dir` into a definition.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidDefinition`] when the manifest
    /// violates definition invariants.
    pub fn into_definition(self, server_dir: &Utf8Path) -> DiscoveryResult<ServerDefinition> {
        let invalid = |source| DiscoveryError::InvalidDefinition {
            path: server_dir.to_owned(),
            source,
        };

        let id = match self.id {
            Some(explicit) => ServerId::new(explicit).map_err(invalid)?,
            None => ServerId::from_path(server_dir),
        };

        let command = Utf8PathBuf::from(self.command.trim());
        let executable = if command.is_relative() && command.components().count() > 1 {
            server_dir.join(command)
        } else {
            command
        };

        let base = match (self.transport, self.endpoint) {
            (TransportKind::Http, Some(endpoint)) => {
                ServerDefinition::http(id, self.name, executable, endpoint)
            }
            (TransportKind::Http, None) => Err(RegistryDomainError::InvalidEndpoint(String::new())),
            (TransportKind::Stdio, _) => ServerDefinition::stdio(id, self.name, executable),
        }
        .map_err(invalid)?;

        self.tools
            .into_iter()
            .try_fold(
                base.with_args(self.args)
                    .with_env(self.env)
                    .with_working_directory(server_dir),
                |definition, (name, spec)| definition.with_tool(name, spec),
            )
            .map_err(invalid)
    }
}

/// Discovers servers from manifests below a root directory.
#[derive(Debug, Clone)]
pub struct ManifestDirectorySource {
    root: Utf8PathBuf,
    manifest_file: String,
}

impl ManifestDirectorySource {
    /// Creates a source scanning `root` for [`DEFAULT_MANIFEST_FILE`].
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_owned(),
        }
    }

    /// Overrides the manifest file name.
    #[must_use]
    pub fn with_manifest_file(mut self, name: impl Into<String>) -> Self {
        self.manifest_file = name.into();
        self
    }

    fn scan(&self) -> DiscoveryResult<Vec<ServerDefinition>> {
        let unreadable = |err: std::io::Error| DiscoveryError::Unreadable {
            path: self.root.clone(),
            source: Arc::new(err),
        };
        let root = Dir::open_ambient_dir(&self.root, ambient_authority()).map_err(unreadable)?;

        let mut names = Vec::new();
        for entry in root.entries().map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            if entry.file_type().map_err(unreadable)?.is_dir() {
                names.push(entry.file_name().map_err(unreadable)?);
            }
        }
        names.sort();

        let mut definitions = Vec::with_capacity(names.len());
        for name in names {
            let server_dir = self.root.join(&name);
            match self.load_manifest(&root, &name, &server_dir) {
                Ok(Some(definition)) => definitions.push(definition),
                Ok(None) => debug!(dir = %server_dir, "no manifest; skipped"),
                Err(err) => warn!(dir = %server_dir, error = %err, "skipping server manifest"),
            }
        }
        Ok(definitions)
    }

    fn load_manifest(
        &self,
        root: &Dir,
        name: &str,
        server_dir: &Utf8Path,
    ) -> DiscoveryResult<Option<ServerDefinition>> {
        let manifest_path = server_dir.join(&self.manifest_file);
        let unreadable = |err: std::io::Error| DiscoveryError::Unreadable {
            path: manifest_path.clone(),
            source: Arc::new(err),
        };

        let dir = root.open_dir(name).map_err(unreadable)?;
        let contents = match dir.read_to_string(&self.manifest_file) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(unreadable(err)),
        };

        let manifest: ServerManifest =
            serde_json::from_str(&contents).map_err(|err| DiscoveryError::MalformedManifest {
                path: manifest_path.clone(),
                reason: err.to_string(),
            })?;
        manifest.into_definition(server_dir).map(Some)
    }
}

#[async_trait]
impl DefinitionSource for ManifestDirectorySource {
    async fn discover(&self) -> DiscoveryResult<Vec<ServerDefinition>> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.scan())
            .await
            .map_err(|err| DiscoveryError::Unreadable {
                path: self.root.clone(),
                source: Arc::new(std::io::Error::other(format!("scan task failed: {err}"))),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write_manifest(root: &Utf8Path, dir: &str, manifest: &serde_json::Value) {
        let server_dir = root.join(dir);
        fs::create_dir_all(&server_dir).expect("create server dir");
        fs::write(
            server_dir.join(DEFAULT_MANIFEST_FILE),
            serde_json::to_vec_pretty(manifest).expect("serialise manifest"),
        )
        .expect("write manifest");
    }

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 temp path");
        (temp, root)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn discovers_valid_manifests_and_skips_broken_ones() {
        let (_temp, root) = temp_root();
        write_manifest(
            &root,
            "files",
            &json!({
                "name": "Files",
                "command": "./bin/files",
                "args": ["--stdio"],
                "tools": {"read": {"inputSchema": {"type": "object", "required": ["path"]}}}
            }),
        );
        write_manifest(&root, "broken", &json!({"name": "No command"}));
        fs::create_dir_all(root.join("empty")).expect("create empty dir");

        let definitions = ManifestDirectorySource::new(root.clone())
            .discover()
            .await
            .expect("discovery should succeed");

        assert_eq!(definitions.len(), 1);
        let files = definitions.first().expect("definition should exist");
        assert_eq!(files.id(), &ServerId::from_path(&root.join("files")));
        assert_eq!(files.executable_path(), root.join("files").join("bin/files"));
        assert_eq!(files.launch_args(), ["--stdio"]);
        assert!(files.tool("read").is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn explicit_id_and_http_transport_are_honoured() {
        let (_temp, root) = temp_root();
        write_manifest(
            &root,
            "web",
            &json!({
                "id": "web-tools",
                "name": "Web",
                "command": "web-server",
                "transport": "http",
                "endpoint": "http://127.0.0.1:7000/rpc"
            }),
        );

        let definitions = ManifestDirectorySource::new(root)
            .discover()
            .await
            .expect("discovery should succeed");

        let web = definitions.first().expect("definition should exist");
        assert_eq!(web.id().as_str(), "web-tools");
        assert_eq!(web.transport_kind(), TransportKind::Http);
        assert_eq!(web.executable_path(), "web-server");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_root_is_an_error() {
        let result = ManifestDirectorySource::new("/nonexistent/switchyard/servers")
            .discover()
            .await;
        assert!(matches!(result, Err(DiscoveryError::Unreadable { .. })));
    }
}
