//! Control-plane configuration loaded from TOML.
//!
//! Every section except `[supervisor.restart]` is optional and falls back to
//! documented defaults. The restart policy has no default and must be
//! stated.

use crate::registry::adapters::DEFAULT_MANIFEST_FILE;
use crate::router::domain::{DEFAULT_HISTORY_CAPACITY, RouterConfig};
use crate::supervisor::domain::{RestartPolicy, SupervisorConfig};
use crate::sync::domain::{ClientId, ClientKind, ClientProfile, SyncConfig};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default directory scanned for server manifests.
pub const DEFAULT_MANIFEST_DIR: &str = "servers";

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    Read {
        /// File that failed to read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        source: Arc<std::io::Error>,
    },

    /// The file is not valid TOML for this schema.
    #[error("cannot parse configuration: {0}")]
    Parse(String),

    /// A value parsed but is not acceptable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    supervisor: RawSupervisor,
    #[serde(default)]
    router: RawRouter,
    #[serde(default)]
    sync: RawSync,
    #[serde(default)]
    discovery: RawDiscovery,
    #[serde(default)]
    clients: Vec<RawClient>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSupervisor {
    start_timeout_ms: Option<u64>,
    stop_grace_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    lock_timeout_ms: Option<u64>,
    heartbeat_probe: Option<bool>,
    restart: RawRestart,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRestart {
    auto_restart: bool,
    /// Automatic restarts allowed per server. The first `max_restarts`
    /// crashes are restarted and the next one leaves the server crashed.
    max_restarts: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRouter {
    call_timeout_ms: Option<u64>,
    history_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSync {
    max_retries: Option<u32>,
    backup_suffix: Option<String>,
    lock_timeout_ms: Option<u64>,
    io_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDiscovery {
    manifest_dir: Option<Utf8PathBuf>,
    manifest_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClient {
    id: String,
    kind: String,
    path: Utf8PathBuf,
    section: Option<String>,
}

/// Where server manifests are discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    manifest_dir: Utf8PathBuf,
    manifest_file: String,
}

impl DiscoveryConfig {
    /// Returns the directory whose subdirectories hold manifests.
    #[must_use]
    pub fn manifest_dir(&self) -> &Utf8Path {
        &self.manifest_dir
    }

    /// Returns the manifest file name looked for in each subdirectory.
    #[must_use]
    pub fn manifest_file(&self) -> &str {
        &self.manifest_file
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            manifest_dir: Utf8PathBuf::from(DEFAULT_MANIFEST_DIR),
            manifest_file: DEFAULT_MANIFEST_FILE.to_owned(),
        }
    }
}

/// Complete control-plane settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneConfig {
    supervisor: SupervisorConfig,
    router: RouterConfig,
    history_capacity: usize,
    sync: SyncConfig,
    discovery: DiscoveryConfig,
    clients: Vec<ClientProfile>,
}

impl ControlPlaneConfig {
    /// Reads and parses a configuration file.
    ///
    /// Relative manifest and client paths are resolved against the
    /// directory containing the file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, and
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`] when its content
    /// is unacceptable.
    pub fn load(path: &Utf8Path) -> ConfigResult<Self> {
        let read_error = |err: std::io::Error| ConfigError::Read {
            path: path.to_owned(),
            source: Arc::new(err),
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| read_error(std::io::Error::other("path must include a file name")))?;
        let base = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let dir = Dir::open_ambient_dir(base, ambient_authority()).map_err(read_error)?;
        let text = dir.read_to_string(file_name).map_err(read_error)?;
        Self::parse_relative_to(&text, Some(base))
    }

    /// Parses configuration text, leaving relative paths as written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn parse(text: &str) -> ConfigResult<Self> {
        Self::parse_relative_to(text, None)
    }

    fn parse_relative_to(text: &str, base: Option<&Utf8Path>) -> ConfigResult<Self> {
        let raw: RawConfig = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let resolve = |path: Utf8PathBuf| match base {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        };

        let supervisor = supervisor_config(&raw.supervisor)?;
        let router = RouterConfig::new(millis_or(raw.router.call_timeout_ms, RouterConfig::default().call_timeout())?);
        let history_capacity = raw.router.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY);
        if history_capacity == 0 {
            return Err(ConfigError::Invalid("router.history_capacity must be positive".to_owned()));
        }
        let sync = sync_config(raw.sync)?;
        let discovery = DiscoveryConfig {
            manifest_dir: resolve(
                raw.discovery
                    .manifest_dir
                    .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_MANIFEST_DIR)),
            ),
            manifest_file: raw
                .discovery
                .manifest_file
                .unwrap_or_else(|| DEFAULT_MANIFEST_FILE.to_owned()),
        };

        let mut seen = BTreeSet::new();
        let mut clients = Vec::with_capacity(raw.clients.len());
        for client in raw.clients {
            let id = ClientId::new(client.id).map_err(|err| ConfigError::Invalid(err.to_string()))?;
            if !seen.insert(id.clone()) {
                return Err(ConfigError::Invalid(format!("client {id} is configured twice")));
            }
            let kind = ClientKind::try_from(client.kind.as_str())
                .map_err(|err| ConfigError::Invalid(format!("client {id}: {err}")))?;
            let profile = ClientProfile::new(id.clone(), kind, resolve(client.path), client.section.as_deref())
                .map_err(|err| ConfigError::Invalid(format!("client {id}: {err}")))?;
            clients.push(profile);
        }

        Ok(Self {
            supervisor,
            router,
            history_capacity,
            sync,
            discovery,
            clients,
        })
    }

    /// Returns the supervisor settings.
    #[must_use]
    pub const fn supervisor(&self) -> SupervisorConfig {
        self.supervisor
    }

    /// Returns the router settings.
    #[must_use]
    pub const fn router(&self) -> RouterConfig {
        self.router
    }

    /// Returns how many call records are retained.
    #[must_use]
    pub const fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Returns the synchroniser settings.
    #[must_use]
    pub const fn sync(&self) -> &SyncConfig {
        &self.sync
    }

    /// Returns the discovery settings.
    #[must_use]
    pub const fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    /// Returns the configured clients.
    #[must_use]
    pub fn clients(&self) -> &[ClientProfile] {
        &self.clients
    }
}

fn millis_or(value: Option<u64>, default: Duration) -> ConfigResult<Duration> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Invalid("timeouts must be positive".to_owned())),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}

fn supervisor_config(raw: &RawSupervisor) -> ConfigResult<SupervisorConfig> {
    let policy = RestartPolicy::new(raw.restart.auto_restart, raw.restart.max_restarts);
    let defaults = SupervisorConfig::new(policy);
    Ok(defaults
        .with_start_timeout(millis_or(raw.start_timeout_ms, defaults.start_timeout())?)
        .with_stop_grace(millis_or(raw.stop_grace_ms, defaults.stop_grace())?)
        .with_heartbeat_interval(millis_or(raw.heartbeat_interval_ms, defaults.heartbeat_interval())?)
        .with_lock_timeout(millis_or(raw.lock_timeout_ms, defaults.lock_timeout())?)
        .with_heartbeat_probe(raw.heartbeat_probe.unwrap_or_else(|| defaults.heartbeat_probe())))
}

fn sync_config(raw: RawSync) -> ConfigResult<SyncConfig> {
    let defaults = SyncConfig::default();
    let backup_suffix = raw
        .backup_suffix
        .unwrap_or_else(|| defaults.backup_suffix().to_owned());
    let suffix_is_plain = !backup_suffix.is_empty()
        && backup_suffix
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '~'));
    if !suffix_is_plain {
        return Err(ConfigError::Invalid(format!(
            "sync.backup_suffix `{backup_suffix}` must be non-empty and contain only letters, digits, `-`, `_` or `~`"
        )));
    }
    Ok(SyncConfig::default()
        .with_max_retries(raw.max_retries.unwrap_or_else(|| defaults.max_retries()))
        .with_lock_timeout(millis_or(raw.lock_timeout_ms, defaults.lock_timeout())?)
        .with_io_timeout(millis_or(raw.io_timeout_ms, defaults.io_timeout())?)
        .with_backup_suffix(backup_suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    const FULL: &str = r#"
[supervisor]
start_timeout_ms = 2000
stop_grace_ms = 1000
heartbeat_interval_ms = 250
heartbeat_probe = false

[supervisor.restart]
auto_restart = true
max_restarts = 2

[router]
call_timeout_ms = 1500
history_capacity = 10

[sync]
max_retries = 5
backup_suffix = "orig"

[discovery]
manifest_dir = "/srv/mcp"

[[clients]]
id = "claude-desktop"
kind = "claude_desktop"
path = "/home/me/.config/Claude/claude_desktop_config.json"

[[clients]]
id = "editor"
kind = "custom"
path = "/home/me/.editor/settings.json"
section = "mcp.servers"
"#;

    #[rstest]
    fn full_configuration_is_honoured() {
        let config = ControlPlaneConfig::parse(FULL).expect("config should parse");

        assert_eq!(config.supervisor().restart_policy(), RestartPolicy::new(true, 2));
        assert_eq!(config.supervisor().start_timeout(), Duration::from_secs(2));
        assert_eq!(config.supervisor().heartbeat_interval(), Duration::from_millis(250));
        assert!(!config.supervisor().heartbeat_probe());
        assert_eq!(config.router().call_timeout(), Duration::from_millis(1500));
        assert_eq!(config.history_capacity(), 10);
        assert_eq!(config.sync().max_retries(), 5);
        assert_eq!(config.sync().backup_suffix(), "orig");
        assert_eq!(config.discovery().manifest_dir(), Utf8Path::new("/srv/mcp"));
        assert_eq!(config.discovery().manifest_file(), DEFAULT_MANIFEST_FILE);
        let ids: Vec<String> = config.clients().iter().map(|client| client.id().to_string()).collect();
        assert_eq!(ids, ["claude-desktop", "editor"]);
    }

    #[rstest]
    fn minimal_configuration_uses_defaults() {
        let config = ControlPlaneConfig::parse(
            "[supervisor.restart]\nauto_restart = false\nmax_restarts = 0\n",
        )
        .expect("config should parse");

        assert_eq!(config.supervisor(), SupervisorConfig::new(RestartPolicy::manual()));
        assert_eq!(config.router(), RouterConfig::default());
        assert_eq!(config.sync(), &SyncConfig::default());
        assert_eq!(config.discovery(), &DiscoveryConfig::default());
        assert!(config.clients().is_empty());
    }

    #[rstest]
    #[case::restart_policy_required("[supervisor]\nstart_timeout_ms = 10\n")]
    #[case::unknown_key("[supervisor.restart]\nauto_restart = false\nmax_restarts = 0\nretry = 1\n")]
    #[case::not_toml("[supervisor")]
    fn malformed_configuration_is_a_parse_error(#[case] text: &str) {
        assert!(matches!(ControlPlaneConfig::parse(text), Err(ConfigError::Parse(_))));
    }

    #[rstest]
    #[case::zero_timeout("[router]\ncall_timeout_ms = 0\n")]
    #[case::empty_history("[router]\nhistory_capacity = 0\n")]
    #[case::bad_suffix("[sync]\nbackup_suffix = \"../x\"\n")]
    #[case::unknown_kind("[[clients]]\nid = \"x\"\nkind = \"emacs\"\npath = \"/x.json\"\n")]
    #[case::custom_without_section("[[clients]]\nid = \"x\"\nkind = \"custom\"\npath = \"/x.json\"\n")]
    #[case::duplicate_client(
        "[[clients]]\nid = \"x\"\nkind = \"cursor\"\npath = \"/a.json\"\n[[clients]]\nid = \"x\"\nkind = \"zed\"\npath = \"/b.json\"\n"
    )]
    fn unacceptable_values_are_invalid(#[case] section: &str) {
        let text = format!("[supervisor.restart]\nauto_restart = false\nmax_restarts = 0\n{section}");

        assert!(matches!(ControlPlaneConfig::parse(&text), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn load_resolves_relative_paths_against_the_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 temp path");
        let path = root.join("switchyard.toml");
        fs::write(
            &path,
            "[supervisor.restart]\nauto_restart = false\nmax_restarts = 0\n\
             [[clients]]\nid = \"cursor\"\nkind = \"cursor\"\npath = \"cursor/mcp.json\"\n",
        )
        .expect("write config");

        let config = ControlPlaneConfig::load(&path).expect("config should load");

        assert_eq!(config.discovery().manifest_dir(), root.join(DEFAULT_MANIFEST_DIR));
        assert_eq!(
            config.clients().first().map(ClientProfile::path),
            Some(root.join("cursor/mcp.json").as_path())
        );
    }

    #[rstest]
    fn missing_file_is_a_read_error() {
        let result = ControlPlaneConfig::load(Utf8Path::new("/definitely/not/here/switchyard.toml"));

        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
