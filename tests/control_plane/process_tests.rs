//! Supervision of real operating-system processes.

use crate::test_helpers::{server_id, server_with_tool};
use mockable::DefaultClock;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::time::Duration;
use switchyard::error::ErrorKind;
use switchyard::registry::{domain::ServerState, services::ServerRegistry};
use switchyard::supervisor::{
    adapters::TokioWorkerHost,
    domain::{LivenessOutcome, RestartPolicy, SupervisorConfig},
    services::ProcessSupervisor,
};
use switchyard::transport::adapters::InMemoryTransport;

type OsSupervisor = ProcessSupervisor<TokioWorkerHost, InMemoryTransport, DefaultClock>;

struct OsHarness {
    registry: Arc<ServerRegistry>,
    supervisor: Arc<OsSupervisor>,
}

fn harness_with_grace(stop_grace: Duration) -> OsHarness {
    let registry = Arc::new(ServerRegistry::new());
    let supervisor = Arc::new(ProcessSupervisor::new(
        Arc::clone(&registry),
        Arc::new(TokioWorkerHost::new()),
        Arc::new(InMemoryTransport::new()),
        Arc::new(DefaultClock),
        SupervisorConfig::new(RestartPolicy::manual())
            .with_start_timeout(Duration::from_secs(2))
            .with_stop_grace(stop_grace)
            .with_heartbeat_probe(false),
    ));
    OsHarness { registry, supervisor }
}

#[fixture]
fn os() -> OsHarness {
    harness_with_grace(Duration::from_secs(2))
}

fn process_exists(pid: u32) -> eyre::Result<bool> {
    let raw = i32::try_from(pid)?;
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(err) => Err(eyre::eyre!("cannot probe pid {pid}: {err}")),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn start_then_stop_leaves_no_process(os: OsHarness) -> eyre::Result<()> {
    let definition = server_with_tool("sleeper", "ping", "/bin/sleep")?.with_args(["30".to_owned()]);
    os.registry.insert(definition, &DefaultClock)?;
    let id = server_id("sleeper")?;

    let running = os.supervisor.start(&id).await?;
    let pid = running
        .runtime()
        .pid()
        .ok_or_else(|| eyre::eyre!("running server has no pid"))?;
    eyre::ensure!(process_exists(pid)?, "worker {pid} is not alive after start");
    let stopped = os.supervisor.stop(&id).await?;

    assert_eq!(stopped.state(), ServerState::Stopped);
    assert_eq!(stopped.runtime().pid(), None);
    assert!(!process_exists(pid)?, "worker {pid} leaked after stop");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_executable_is_a_spawn_error(os: OsHarness) -> eyre::Result<()> {
    os.registry.insert(
        server_with_tool("ghost", "ping", "/nonexistent/switchyard-worker")?,
        &DefaultClock,
    )?;
    let id = server_id("ghost")?;

    let error = os
        .supervisor
        .start(&id)
        .await
        .err()
        .ok_or_else(|| eyre::eyre!("start of a missing executable succeeded"))?;

    assert_eq!(error.kind(), ErrorKind::SpawnError);
    assert_eq!(os.supervisor.status(&id)?.state(), ServerState::Stopped);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unexpected_exit_is_detected_with_its_code(os: OsHarness) -> eyre::Result<()> {
    let definition = server_with_tool("quitter", "ping", "/bin/sh")?
        .with_args(["-c".to_owned(), "sleep 0.2; exit 3".to_owned()]);
    os.registry.insert(definition, &DefaultClock)?;
    let id = server_id("quitter")?;
    os.supervisor.start(&id).await?;

    tokio::time::sleep(Duration::from_millis(800)).await;
    let outcome = os.supervisor.check_liveness(&id).await?;

    assert_eq!(outcome, LivenessOutcome::Crashed { restarted: false });
    let entry = os.supervisor.status(&id)?;
    assert_eq!(entry.state(), ServerState::Crashed);
    assert_eq!(entry.runtime().exit_code(), Some(3));
    assert_eq!(entry.runtime().restart_count(), 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn worker_ignoring_termination_is_killed_after_the_grace_period() -> eyre::Result<()> {
    let grace = Duration::from_millis(300);
    let os = harness_with_grace(grace);
    let definition = server_with_tool("stubborn", "ping", "/bin/sh")?
        .with_args(["-c".to_owned(), "trap '' TERM; sleep 30".to_owned()]);
    os.registry.insert(definition, &DefaultClock)?;
    let id = server_id("stubborn")?;
    let running = os.supervisor.start(&id).await?;
    let pid = running
        .runtime()
        .pid()
        .ok_or_else(|| eyre::eyre!("running server has no pid"))?;
    // Give the shell time to install its trap before asking it to stop.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let requested = std::time::Instant::now();
    let stopped = os.supervisor.stop(&id).await?;

    assert!(requested.elapsed() >= grace, "stop returned before the grace period");
    assert_eq!(stopped.state(), ServerState::Stopped);
    assert_eq!(stopped.runtime().exit_code(), Some(137));
    assert!(!process_exists(pid)?, "worker {pid} survived the forced kill");
    Ok(())
}
