//! Facade over the four operation groups.
//!
//! Every operation returns an [`OperationResult`]: a success flag, a
//! machine-readable [`ErrorKind`] on failure, human-readable detail and, on
//! success, the operation's value. Batch operations report one result per
//! server or client rather than an aggregate.

use crate::config::ControlPlaneConfig;
use crate::error::ErrorKind;
use crate::registry::{
    adapters::ManifestDirectorySource,
    domain::{RegistryEntry, RegistrySnapshot, ServerId},
    ports::{DefinitionSource, DiscoveryError},
    services::{DiscoveryReport, RegistryError, ServerRegistry},
};
use crate::router::{
    adapters::InMemoryCallHistory,
    domain::{ToolCallRecord, ToolCallRequest, ToolCallResult},
    ports::{CallHistory, CallHistoryError},
    services::{RouterError, ToolExecutionRouter},
};
use crate::supervisor::{
    adapters::TokioWorkerHost,
    domain::LivenessOutcome,
    ports::WorkerHost,
    services::{ProcessSupervisor, SupervisorError},
};
use crate::sync::{
    adapters::FilesystemConfigStore,
    domain::{ClientId, SyncSummary},
    ports::ConfigStore,
    services::{ClientConfigSynchronizer, SyncError},
};
use crate::transport::{adapters::JsonRpcTransport, ports::TransportClient};
use mockable::{Clock, DefaultClock};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Structured outcome of one control-plane operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Failure classification; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Human-readable description.
    pub detail: String,
    /// Operation value; absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
}

impl<T> OperationResult<T> {
    /// Creates a successful result.
    #[must_use]
    pub fn succeeded(value: T, detail: impl Into<String>) -> Self {
        Self {
            success: true,
            error_kind: None,
            detail: detail.into(),
            value: Some(value),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            error_kind: Some(kind),
            detail: detail.into(),
            value: None,
        }
    }

    fn from_result<E: Classified>(result: Result<T, E>, describe: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(value) => {
                let detail = describe(&value);
                Self::succeeded(value, detail)
            }
            Err(err) => Self::failed(err.error_kind(), err.to_string()),
        }
    }
}

/// Errors that carry a stable classification.
trait Classified: fmt::Display {
    fn error_kind(&self) -> ErrorKind;
}

macro_rules! classified {
    ($($error:ty),+ $(,)?) => {
        $(impl Classified for $error {
            fn error_kind(&self) -> ErrorKind {
                self.kind()
            }
        })+
    };
}

classified!(RegistryError, DiscoveryError, SupervisorError, RouterError, SyncError);

impl Classified for CallHistoryError {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

fn parse_server_id<T>(value: &str) -> Result<ServerId, OperationResult<T>> {
    ServerId::new(value)
        .map_err(|err| OperationResult::failed(ErrorKind::UnknownServer, format!("invalid server id: {err}")))
}

fn parse_client_id<T>(value: &str) -> Result<ClientId, OperationResult<T>> {
    ClientId::new(value)
        .map_err(|err| OperationResult::failed(ErrorKind::DefinitionError, format!("invalid client id: {err}")))
}

/// Per-server result of a batch lifecycle operation.
pub type ServerResults<T> = Vec<(ServerId, OperationResult<T>)>;

/// Control plane wired for local OS processes and real client files.
pub type LocalControlPlane = ControlPlane<
    TokioWorkerHost,
    JsonRpcTransport,
    InMemoryCallHistory,
    FilesystemConfigStore,
    DefaultClock,
>;

/// Composes the registry, supervisor, router and synchroniser.
pub struct ControlPlane<H, T, R, S, C>
where
    H: WorkerHost + 'static,
    T: TransportClient + 'static,
    R: CallHistory,
    S: ConfigStore,
    C: Clock + Send + Sync + 'static,
{
    registry: Arc<ServerRegistry>,
    supervisor: Arc<ProcessSupervisor<H, T, C>>,
    router: ToolExecutionRouter<T, R, C>,
    synchronizer: ClientConfigSynchronizer<S>,
    discovery: Option<Arc<dyn DefinitionSource>>,
    clock: Arc<C>,
}

impl LocalControlPlane {
    /// Builds a control plane from loaded configuration.
    #[must_use]
    pub fn local(config: &ControlPlaneConfig) -> Self {
        let registry = Arc::new(ServerRegistry::new());
        let transport = Arc::new(JsonRpcTransport::new());
        let clock = Arc::new(DefaultClock);
        let supervisor = Arc::new(ProcessSupervisor::new(
            Arc::clone(&registry),
            Arc::new(TokioWorkerHost::new()),
            Arc::clone(&transport),
            Arc::clone(&clock),
            config.supervisor(),
        ));
        let router = ToolExecutionRouter::new(
            Arc::clone(&registry),
            transport,
            Arc::new(InMemoryCallHistory::with_capacity(config.history_capacity())),
            Arc::clone(&clock),
            config.router(),
        );
        let synchronizer = ClientConfigSynchronizer::new(
            Arc::clone(&registry),
            Arc::new(FilesystemConfigStore::new()),
            config.clients().to_vec(),
            config.sync().clone(),
        );
        let discovery = ManifestDirectorySource::new(config.discovery().manifest_dir())
            .with_manifest_file(config.discovery().manifest_file());
        Self::new(registry, supervisor, router, synchronizer, clock).with_discovery(Arc::new(discovery))
    }
}

impl<H, T, R, S, C> ControlPlane<H, T, R, S, C>
where
    H: WorkerHost + 'static,
    T: TransportClient + 'static,
    R: CallHistory,
    S: ConfigStore,
    C: Clock + Send + Sync + 'static,
{
    /// Composes already-built services sharing one registry.
    #[must_use]
    pub const fn new(
        registry: Arc<ServerRegistry>,
        supervisor: Arc<ProcessSupervisor<H, T, C>>,
        router: ToolExecutionRouter<T, R, C>,
        synchronizer: ClientConfigSynchronizer<S>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            router,
            synchronizer,
            discovery: None,
            clock,
        }
    }

    /// Sets the source consulted by [`Self::discover`].
    #[must_use]
    pub fn with_discovery(mut self, source: Arc<dyn DefinitionSource>) -> Self {
        self.discovery = Some(source);
        self
    }

    /// Returns the shared registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Returns the process supervisor.
    #[must_use]
    pub const fn supervisor(&self) -> &Arc<ProcessSupervisor<H, T, C>> {
        &self.supervisor
    }

    /// Returns the client synchroniser.
    #[must_use]
    pub const fn synchronizer(&self) -> &ClientConfigSynchronizer<S> {
        &self.synchronizer
    }

    // Registry query

    /// Returns a consistent view of every registered server.
    #[must_use]
    pub fn list_servers(&self) -> OperationResult<RegistrySnapshot> {
        OperationResult::from_result(self.registry.snapshot(), |snapshot| {
            format!("{} servers at revision {}", snapshot.entries().len(), snapshot.revision())
        })
    }

    /// Runs discovery and applies the result to the registry.
    pub async fn discover(&self, prune_missing: bool) -> OperationResult<DiscoveryReport> {
        let Some(source) = &self.discovery else {
            return OperationResult::failed(ErrorKind::DefinitionError, "no discovery source configured");
        };
        let definitions = match source.discover().await {
            Ok(definitions) => definitions,
            Err(err) => return OperationResult::failed(err.kind(), err.to_string()),
        };
        let applied = self
            .registry
            .apply_discovery(definitions, prune_missing, &*self.clock);
        OperationResult::from_result(applied, |report| {
            format!(
                "{} added, {} replaced, {} unchanged, {} pruned",
                report.added.len(),
                report.replaced.len(),
                report.unchanged.len(),
                report.pruned.len()
            )
        })
    }

    // Process control

    /// Returns a server's definition and runtime record.
    #[must_use]
    pub fn status(&self, server_id: &str) -> OperationResult<RegistryEntry> {
        let server_id = match parse_server_id(server_id) {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        OperationResult::from_result(self.supervisor.status(&server_id), describe_entry)
    }

    /// Starts a server and waits for readiness.
    pub async fn start(&self, server_id: &str) -> OperationResult<RegistryEntry> {
        let server_id = match parse_server_id(server_id) {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        OperationResult::from_result(self.supervisor.start(&server_id).await, describe_entry)
    }

    /// Stops a server; stopping a stopped server succeeds.
    pub async fn stop(&self, server_id: &str) -> OperationResult<RegistryEntry> {
        let server_id = match parse_server_id(server_id) {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        OperationResult::from_result(self.supervisor.stop(&server_id).await, describe_entry)
    }

    /// Runs one liveness check.
    pub async fn check_liveness(&self, server_id: &str) -> OperationResult<LivenessOutcome> {
        let server_id = match parse_server_id(server_id) {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        OperationResult::from_result(self.supervisor.check_liveness(&server_id).await, |outcome| {
            format!("liveness check: {outcome:?}")
        })
    }

    /// Starts every stopped server.
    pub async fn start_all(&self) -> OperationResult<ServerResults<RegistryEntry>> {
        let started = Arc::clone(&self.supervisor).start_all().await;
        batch(started)
    }

    /// Stops every server that is not stopped.
    pub async fn stop_all(&self) -> OperationResult<ServerResults<RegistryEntry>> {
        let stopped = Arc::clone(&self.supervisor).stop_all().await;
        batch(stopped)
    }

    // Tool execution

    /// Validates and dispatches one tool call.
    pub async fn execute(&self, server_id: &str, tool_name: &str, parameters: Value) -> OperationResult<ToolCallResult> {
        self.execute_with_cancel(server_id, tool_name, parameters, &CancellationToken::new())
            .await
    }

    /// As [`Self::execute`], abandoning the wait when `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        server_id: &str,
        tool_name: &str,
        parameters: Value,
        cancel: &CancellationToken,
    ) -> OperationResult<ToolCallResult> {
        let request = ToolCallRequest::new(server_id, tool_name, parameters);
        OperationResult::from_result(
            self.router.execute_with_cancel(request, cancel).await,
            |result| format!("call {} finished with outcome {}", result.call_id, result.outcome),
        )
    }

    /// Returns up to `limit` of the most recent call records, oldest first.
    pub async fn call_history(&self, limit: usize) -> OperationResult<Vec<ToolCallRecord>> {
        OperationResult::from_result(self.router.history().recent(limit).await, |records| {
            format!("{} call records", records.len())
        })
    }

    // Client sync

    /// Synchronises one client's configuration file.
    pub async fn sync_client(&self, client: &str) -> OperationResult<SyncSummary> {
        let client = match parse_client_id(client) {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        OperationResult::from_result(self.synchronizer.sync_client(&client).await, describe_sync)
    }

    /// Synchronises every configured client, one result per client.
    pub async fn sync_all(&self) -> OperationResult<Vec<(ClientId, OperationResult<SyncSummary>)>> {
        let reports: Vec<_> = self
            .synchronizer
            .sync_all()
            .await
            .into_iter()
            .map(|report| (report.client, OperationResult::from_result(report.result, describe_sync)))
            .collect();
        let failed = reports.iter().filter(|(_, result)| !result.success).count();
        let detail = format!("{} of {} clients synchronised", reports.len().saturating_sub(failed), reports.len());
        OperationResult::succeeded(reports, detail)
    }

    /// Adds one registered server to a client's file.
    pub async fn add_server(&self, client: &str, server_id: &str) -> OperationResult<SyncSummary> {
        let (client, server_id) = match (parse_client_id(client), parse_server_id(server_id)) {
            (Ok(client), Ok(server_id)) => (client, server_id),
            (Err(failure), _) | (_, Err(failure)) => return failure,
        };
        OperationResult::from_result(self.synchronizer.add_server(&client, &server_id).await, describe_sync)
    }

    /// Removes one server from a client's file.
    pub async fn remove_server(&self, client: &str, server_id: &str) -> OperationResult<SyncSummary> {
        let (client, server_id) = match (parse_client_id(client), parse_server_id(server_id)) {
            (Ok(client), Ok(server_id)) => (client, server_id),
            (Err(failure), _) | (_, Err(failure)) => return failure,
        };
        OperationResult::from_result(
            self.synchronizer.remove_server(&client, &server_id).await,
            describe_sync,
        )
    }

    /// Restores a client's file from its backup.
    pub async fn restore_backup(&self, client: &str) -> OperationResult<SyncSummary> {
        let client = match parse_client_id(client) {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        OperationResult::from_result(self.synchronizer.restore_backup(&client).await, describe_sync)
    }
}

fn describe_entry(entry: &RegistryEntry) -> String {
    format!("server {} is {}", entry.id(), entry.state())
}

fn describe_sync(summary: &SyncSummary) -> String {
    format!("client {} at {}: {:?}", summary.client, summary.path, summary.outcome)
}

fn batch(
    results: Result<Vec<(ServerId, Result<RegistryEntry, SupervisorError>)>, SupervisorError>,
) -> OperationResult<ServerResults<RegistryEntry>> {
    OperationResult::from_result(
        results.map(|items| {
            items
                .into_iter()
                .map(|(server_id, result)| (server_id, OperationResult::from_result(result, describe_entry)))
                .collect::<Vec<_>>()
        }),
        |items| {
            let failed = items.iter().filter(|(_, result)| !result.success).count();
            format!("{} of {} servers succeeded", items.len().saturating_sub(failed), items.len())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        adapters::StaticDefinitionSource,
        domain::{ServerDefinition, ServerState, ToolSpec},
    };
    use crate::router::{domain::CallOutcome, domain::RouterConfig};
    use crate::supervisor::{
        adapters::InMemoryWorkerHost,
        domain::{RestartPolicy, SupervisorConfig},
    };
    use crate::sync::{
        adapters::InMemoryConfigStore,
        domain::{ClientKind, ClientProfile, SyncConfig},
    };
    use crate::transport::adapters::InMemoryTransport;
    use camino::Utf8Path;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use std::time::Duration;

    type TestControlPlane =
        ControlPlane<InMemoryWorkerHost, InMemoryTransport, InMemoryCallHistory, InMemoryConfigStore, DefaultClock>;

    struct Harness {
        plane: TestControlPlane,
        host: Arc<InMemoryWorkerHost>,
        store: Arc<InMemoryConfigStore>,
    }

    fn ping_server() -> ServerDefinition {
        ServerDefinition::stdio(ServerId::new("srv-1").expect("valid id"), "Server one", "/opt/srv-1/server")
            .expect("valid definition")
            .with_tool("ping", ToolSpec::without_parameters())
            .expect("valid tool")
    }

    #[fixture]
    fn harness() -> Harness {
        let registry = Arc::new(ServerRegistry::new());
        let host = Arc::new(InMemoryWorkerHost::new());
        let transport = Arc::new(InMemoryTransport::new());
        let store = Arc::new(InMemoryConfigStore::new());
        let clock = Arc::new(DefaultClock);
        let supervisor = Arc::new(ProcessSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&host),
            Arc::clone(&transport),
            Arc::clone(&clock),
            SupervisorConfig::new(RestartPolicy::manual()).with_start_timeout(Duration::from_millis(200)),
        ));
        let router = ToolExecutionRouter::new(
            Arc::clone(&registry),
            transport,
            Arc::new(InMemoryCallHistory::default()),
            Arc::clone(&clock),
            RouterConfig::default(),
        );
        let profile = ClientProfile::new(
            ClientId::new("cursor").expect("valid id"),
            ClientKind::Cursor,
            "/home/me/.cursor/mcp.json",
            None,
        )
        .expect("valid profile");
        let synchronizer = ClientConfigSynchronizer::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            [profile],
            SyncConfig::default(),
        );
        let plane = ControlPlane::new(registry, supervisor, router, synchronizer, clock)
            .with_discovery(Arc::new(StaticDefinitionSource::new(vec![ping_server()])));
        Harness { plane, host, store }
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn discover_start_execute_and_sync(harness: Harness) {
        let discovered = harness.plane.discover(false).await;
        assert!(discovered.success, "{}", discovered.detail);

        let started = harness.plane.start("srv-1").await;
        assert_eq!(started.value.map(|entry| entry.state()), Some(ServerState::Running));

        let called = harness.plane.execute("srv-1", "ping", json!({})).await;
        assert!(called.success, "{}", called.detail);
        assert_eq!(called.value.map(|result| result.outcome), Some(CallOutcome::Success));

        let synced = harness.plane.sync_client("cursor").await;
        assert!(synced.success, "{}", synced.detail);
        assert!(
            harness
                .store
                .contents(Utf8Path::new("/home/me/.cursor/mcp.json"))
                .is_some_and(|text| text.contains("srv-1"))
        );
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn execute_against_stopped_server_reports_not_ready(harness: Harness) {
        harness.plane.discover(false).await;

        let called = harness.plane.execute("srv-1", "ping", json!({})).await;

        assert!(!called.success);
        assert_eq!(called.error_kind, Some(ErrorKind::ServerNotReady));
        assert_eq!(harness.host.spawn_count(), 0);
        let history = harness.plane.call_history(10).await;
        assert_eq!(
            history.value.map(|records| records.iter().map(ToolCallRecord::outcome).collect::<Vec<_>>()),
            Some(vec![CallOutcome::Rejected])
        );
    }

    #[rstest]
    #[case("srv 1", ErrorKind::UnknownServer)]
    #[case("ghost", ErrorKind::UnknownServer)]
    fn bad_server_ids_fail_with_a_kind(harness: Harness, #[case] server_id: &str, #[case] kind: ErrorKind) {
        let status = harness.plane.status(server_id);

        assert!(!status.success);
        assert_eq!(status.error_kind, Some(kind));
        assert!(status.value.is_none());
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn stop_twice_succeeds(harness: Harness) {
        harness.plane.discover(false).await;
        harness.plane.start("srv-1").await;

        let first = harness.plane.stop("srv-1").await;
        let second = harness.plane.stop("srv-1").await;

        assert!(first.success && second.success);
        assert_eq!(second.value.map(|entry| entry.state()), Some(ServerState::Stopped));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn sync_all_reports_per_client(harness: Harness) {
        harness.store.insert("/home/me/.cursor/mcp.json", "not json");

        let synced = harness.plane.sync_all().await;

        let reports = synced.value.expect("batch value");
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports.first().and_then(|(_, result)| result.error_kind),
            Some(ErrorKind::ConfigCorruption)
        );
    }

    #[rstest]
    fn results_serialise_without_absent_fields() {
        let failure: OperationResult<()> = OperationResult::failed(ErrorKind::UnknownTool, "no such tool");

        let encoded = serde_json::to_value(&failure).expect("serialise result");

        assert_eq!(
            encoded,
            json!({"success": false, "error_kind": "unknown_tool", "detail": "no such tool"})
        );
    }
}
