//! Shared world state for process supervisor BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use rstest::fixture;
use switchyard::registry::{domain::RegistryEntry, services::ServerRegistry};
use switchyard::router::{
    adapters::InMemoryCallHistory,
    domain::{RouterConfig, ToolCallResult},
    services::{RouterResult, ToolExecutionRouter},
};
use switchyard::supervisor::{
    adapters::InMemoryWorkerHost,
    domain::{RestartPolicy, SupervisorConfig},
    services::{ProcessSupervisor, SupervisorResult},
};
use switchyard::transport::adapters::InMemoryTransport;

/// Supervisor type used by the BDD world.
pub type TestSupervisor = ProcessSupervisor<InMemoryWorkerHost, InMemoryTransport, DefaultClock>;

/// Router type used by the BDD world.
pub type TestRouter = ToolExecutionRouter<InMemoryTransport, InMemoryCallHistory, DefaultClock>;

/// Scenario world for supervisor behaviour tests.
pub struct SupervisorWorld {
    /// Registry shared by the supervisor and router.
    pub registry: Arc<ServerRegistry>,
    /// Simulated process host.
    pub host: Arc<InMemoryWorkerHost>,
    /// The supervisor under test.
    pub supervisor: Arc<TestSupervisor>,
    /// Router dispatching calls to supervised servers.
    pub router: TestRouter,
    /// Results of every start or stop issued by a `When` step.
    pub lifecycle_results: Vec<SupervisorResult<RegistryEntry>>,
    /// Result of the last tool call.
    pub last_call: Option<RouterResult<ToolCallResult>>,
}

impl SupervisorWorld {
    /// Creates a world with an empty registry.
    #[must_use]
    pub fn new() -> Self {
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
            transport,
            Arc::new(InMemoryCallHistory::default()),
            clock,
            RouterConfig::new(Duration::from_secs(1)),
        );
        Self {
            registry,
            host,
            supervisor,
            router,
            lifecycle_results: Vec::new(),
            last_call: None,
        }
    }
}

impl Default for SupervisorWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SupervisorWorld {
    SupervisorWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
