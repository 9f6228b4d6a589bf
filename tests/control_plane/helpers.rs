//! Shared fixtures for control-plane integration tests.

use crate::test_helpers::server_id;
use camino::{Utf8Path, Utf8PathBuf};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use switchyard::control_plane::ControlPlane;
use switchyard::registry::{
    domain::{ServerDefinition, ToolSpec},
    services::ServerRegistry,
};
use switchyard::router::{
    adapters::InMemoryCallHistory,
    domain::RouterConfig,
    services::ToolExecutionRouter,
};
use switchyard::supervisor::{
    adapters::InMemoryWorkerHost,
    domain::{RestartPolicy, SupervisorConfig},
    services::ProcessSupervisor,
};
use switchyard::sync::{
    adapters::FilesystemConfigStore,
    domain::{ClientId, ClientKind, ClientProfile, SyncConfig},
    services::ClientConfigSynchronizer,
};
use switchyard::transport::adapters::InMemoryTransport;

/// Control plane with simulated processes and real client files.
pub type TestPlane =
    ControlPlane<InMemoryWorkerHost, InMemoryTransport, InMemoryCallHistory, FilesystemConfigStore, DefaultClock>;

/// Control plane plus the handles tests inspect.
pub struct PlaneFixture {
    _temp: tempfile::TempDir,
    /// Scratch directory holding client files.
    pub root: Utf8PathBuf,
    /// Shared registry.
    pub registry: Arc<ServerRegistry>,
    /// Simulated process host.
    pub host: Arc<InMemoryWorkerHost>,
    /// Scripted transport.
    pub transport: Arc<InMemoryTransport>,
    /// The facade under test.
    pub plane: Arc<TestPlane>,
}

impl PlaneFixture {
    /// Returns the file of a configured client.
    pub fn client_path(&self, client: &str) -> Utf8PathBuf {
        match client {
            "vscode" => self.root.join("project/.vscode/mcp.json"),
            "zed" => self.root.join("zed/settings.json"),
            _ => self.root.join("Claude/claude_desktop_config.json"),
        }
    }
}

fn profile(root: &Utf8Path, id: &str, kind: ClientKind, relative: &str) -> ClientProfile {
    ClientProfile::new(ClientId::new(id).expect("valid client id"), kind, root.join(relative), None)
        .expect("valid profile")
}

/// Builds a control plane with three clients in a scratch directory.
#[fixture]
pub fn plane() -> PlaneFixture {
    let temp = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 temp path");
    let registry = Arc::new(ServerRegistry::new());
    let host = Arc::new(InMemoryWorkerHost::new());
    let transport = Arc::new(InMemoryTransport::new());
    let clock = Arc::new(DefaultClock);

    let supervisor = Arc::new(ProcessSupervisor::new(
        Arc::clone(&registry),
        Arc::clone(&host),
        Arc::clone(&transport),
        Arc::clone(&clock),
        SupervisorConfig::new(RestartPolicy::manual()).with_start_timeout(Duration::from_millis(500)),
    ));
    let router = ToolExecutionRouter::new(
        Arc::clone(&registry),
        Arc::clone(&transport),
        Arc::new(InMemoryCallHistory::default()),
        Arc::clone(&clock),
        RouterConfig::new(Duration::from_millis(500)),
    );
    let clients = [
        profile(&root, "claude-desktop", ClientKind::ClaudeDesktop, "Claude/claude_desktop_config.json"),
        profile(&root, "vscode", ClientKind::Vscode, "project/.vscode/mcp.json"),
        profile(&root, "zed", ClientKind::Zed, "zed/settings.json"),
    ];
    let synchronizer = ClientConfigSynchronizer::new(
        Arc::clone(&registry),
        Arc::new(FilesystemConfigStore::new()),
        clients,
        SyncConfig::default(),
    );
    let plane = Arc::new(ControlPlane::new(
        Arc::clone(&registry),
        supervisor,
        router,
        synchronizer,
        clock,
    ));

    PlaneFixture {
        _temp: temp,
        root,
        registry,
        host,
        transport,
        plane,
    }
}

/// Schema of the `read_file` tool used by routing tests.
pub fn read_file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "minLength": 1},
            "limit": {"type": "integer", "minimum": 1},
            "encoding": {"enum": ["utf-8", "latin-1"]}
        },
        "required": ["path"],
        "additionalProperties": false
    })
}

/// Builds a stdio server declaring the `read_file` tool.
pub fn file_server(id: &str) -> eyre::Result<ServerDefinition> {
    let definition = ServerDefinition::stdio(server_id(id)?, "Files", format!("/opt/{id}/server"))
        .map_err(|err| eyre::eyre!("invalid definition: {err}"))?
        .with_args(["--root".to_owned(), "/srv".to_owned()]);
    definition
        .with_tool("read_file", ToolSpec::new(read_file_schema()))
        .map_err(|err| eyre::eyre!("invalid tool: {err}"))
}

/// Reads and parses a JSON file.
pub fn read_json(path: &Utf8Path) -> eyre::Result<Value> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
