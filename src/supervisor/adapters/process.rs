//! Worker host backed by real OS processes.

use crate::registry::domain::{ServerDefinition, ServerId, TransportKind};
use crate::supervisor::ports::{
    SpawnedWorker, WorkerExit, WorkerHost, WorkerHostError, WorkerHostResult,
};
use crate::transport::ports::{StdioPipes, WorkerLink};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, warn};

/// Spawns workers with `tokio::process` and owns their handles.
///
/// Children are created with `kill_on_drop`, so dropping the host never
/// leaks a process.
#[derive(Debug, Clone, Default)]
pub struct TokioWorkerHost {
    children: Arc<Mutex<HashMap<ServerId, Child>>>,
}

impl TokioWorkerHost {
    /// Creates a host holding no processes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pid of the process held for a server.
    #[must_use]
    pub fn pid(&self, server_id: &ServerId) -> Option<u32> {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(server_id)
            .and_then(Child::id)
    }

    fn take_child(&self, server_id: &ServerId) -> WorkerHostResult<Child> {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id)
            .ok_or_else(|| WorkerHostError::NotRunning(server_id.clone()))
    }
}

fn build_command(definition: &ServerDefinition) -> Command {
    let mut command = Command::new(definition.executable_path().as_std_path());
    command
        .args(definition.launch_args())
        .envs(definition.env())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(directory) = definition.working_directory() {
        command.current_dir(directory.as_std_path());
    }
    match definition.transport_kind() {
        TransportKind::Stdio => command.stdin(Stdio::piped()).stdout(Stdio::piped()),
        TransportKind::Http => command.stdin(Stdio::null()).stdout(Stdio::null()),
    };
    command
}

fn take_link(definition: &ServerDefinition, child: &mut Child) -> WorkerHostResult<WorkerLink> {
    let missing = |stream: &str| {
        WorkerHostError::runtime(std::io::Error::other(format!(
            "{stream} of server {} was not captured",
            definition.id()
        )))
    };
    match definition.transport_kind() {
        TransportKind::Stdio => {
            let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
            let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
            Ok(WorkerLink::Stdio(StdioPipes::new(stdin, stdout)))
        }
        TransportKind::Http => {
            let endpoint = definition.endpoint().ok_or_else(|| missing("endpoint"))?;
            Ok(WorkerLink::Http {
                endpoint: endpoint.to_owned(),
            })
        }
    }
}

fn forward_stderr(server_id: ServerId, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(server_id = %server_id, stderr = %line, "worker stderr");
        }
    });
}

#[cfg(unix)]
fn exit_from(status: ExitStatus) -> WorkerExit {
    use std::os::unix::process::ExitStatusExt;
    WorkerExit::new(
        status
            .code()
            .or_else(|| status.signal().map(|signal| 128 + signal)),
    )
}

#[cfg(not(unix))]
fn exit_from(status: ExitStatus) -> WorkerExit {
    WorkerExit::new(status.code())
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> WorkerHostResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let raw = i32::try_from(pid).map_err(WorkerHostError::runtime)?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(WorkerHostError::runtime(std::io::Error::from(errno))),
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> WorkerHostResult<()> {
    child.start_kill().map_err(WorkerHostError::runtime)
}

async fn kill_and_reap(child: &mut Child) -> WorkerHostResult<WorkerExit> {
    child.kill().await.map_err(WorkerHostError::runtime)?;
    child.wait().await.map(exit_from).map_err(WorkerHostError::runtime)
}

#[async_trait]
impl WorkerHost for TokioWorkerHost {
    async fn spawn(&self, definition: &ServerDefinition) -> WorkerHostResult<SpawnedWorker> {
        let mut child = build_command(definition)
            .spawn()
            .map_err(|err| WorkerHostError::spawn_failed(definition, err))?;
        let pid = child.id().ok_or_else(|| {
            WorkerHostError::spawn_failed(
                definition,
                std::io::Error::other("process exited before its pid was read"),
            )
        })?;
        let link = take_link(definition, &mut child)?;
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(definition.id().clone(), stderr);
        }

        let previous = self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(definition.id().clone(), child);
        if let Some(mut stale) = previous {
            warn!(server_id = %definition.id(), "replacing a stale process handle");
            // Reaped by the runtime thanks to kill_on_drop.
            drop(stale.start_kill());
        }
        Ok(SpawnedWorker { pid, link })
    }

    async fn terminate(
        &self,
        server_id: &ServerId,
        grace: Duration,
    ) -> WorkerHostResult<WorkerExit> {
        let mut child = self.take_child(server_id)?;
        request_termination(&mut child)?;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status.map(exit_from).map_err(WorkerHostError::runtime),
            Err(_) => {
                warn!(
                    server_id = %server_id,
                    grace_ms = grace.as_millis(),
                    "worker ignored termination request; killing"
                );
                kill_and_reap(&mut child).await
            }
        }
    }

    async fn kill(&self, server_id: &ServerId) -> WorkerHostResult<WorkerExit> {
        let mut child = self.take_child(server_id)?;
        kill_and_reap(&mut child).await
    }

    async fn poll_exit(&self, server_id: &ServerId) -> WorkerHostResult<Option<WorkerExit>> {
        let mut children = self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(child) = children.get_mut(server_id) else {
            return Ok(Some(WorkerExit::new(None)));
        };
        match child.try_wait().map_err(WorkerHostError::runtime)? {
            Some(status) => {
                children.remove(server_id);
                Ok(Some(exit_from(status)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::registry::domain::ServerId;

    fn sleeper(id: &str) -> ServerDefinition {
        ServerDefinition::stdio(ServerId::new(id).expect("valid id"), id, "sleep")
            .expect("valid definition")
            .with_args(["30".to_owned()])
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_executable_is_a_spawn_failure() {
        let host = TokioWorkerHost::new();
        let definition = ServerDefinition::stdio(
            ServerId::new("ghost").expect("valid id"),
            "ghost",
            "/nonexistent/switchyard/worker",
        )
        .expect("valid definition");

        let error = host
            .spawn(&definition)
            .await
            .expect_err("spawn should fail");
        assert!(matches!(error, WorkerHostError::SpawnFailed { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn terminate_reaps_the_process() {
        let host = TokioWorkerHost::new();
        let definition = sleeper("sleeper");
        let spawned = host.spawn(&definition).await.expect("spawn should succeed");
        assert_eq!(host.pid(definition.id()), Some(spawned.pid));
        assert_eq!(
            host.poll_exit(definition.id()).await.expect("poll should succeed"),
            None
        );

        let exit = host
            .terminate(definition.id(), Duration::from_secs(2))
            .await
            .expect("terminate should succeed");
        assert_eq!(exit.code, Some(128 + 15));
        assert_eq!(host.pid(definition.id()), None);
        assert!(matches!(
            host.kill(definition.id()).await,
            Err(WorkerHostError::NotRunning(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn poll_exit_reports_unexpected_exit() {
        let host = TokioWorkerHost::new();
        let definition =
            ServerDefinition::stdio(ServerId::new("short").expect("valid id"), "short", "sh")
                .expect("valid definition")
                .with_args(["-c".to_owned(), "exit 3".to_owned()]);
        host.spawn(&definition).await.expect("spawn should succeed");

        let mut observed = None;
        for _ in 0..50 {
            observed = host
                .poll_exit(definition.id())
                .await
                .expect("poll should succeed");
            if observed.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(observed, Some(WorkerExit::new(Some(3))));
    }
}
