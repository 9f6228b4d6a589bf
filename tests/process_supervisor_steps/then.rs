//! Then steps for process supervisor BDD scenarios.

use super::world::{SupervisorWorld, run_async};
use crate::test_helpers::server_id;
use rstest_bdd_macros::then;
use switchyard::registry::domain::ServerState;
use switchyard::router::{domain::CallOutcome, ports::CallHistory};

#[then("every lifecycle operation succeeded")]
fn every_lifecycle_operation_succeeded(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    if world.lifecycle_results.is_empty() {
        return Err(eyre::eyre!("no lifecycle operation was issued"));
    }
    for result in &world.lifecycle_results {
        if let Err(err) = result {
            return Err(eyre::eyre!("expected success, got {err}"));
        }
    }
    Ok(())
}

#[then(r#"the last lifecycle operation failed with "{kind}""#)]
fn last_lifecycle_failed_with(world: &SupervisorWorld, kind: String) -> Result<(), eyre::Report> {
    match world.lifecycle_results.last() {
        Some(Err(err)) if err.kind().as_str() == kind => Ok(()),
        Some(Err(err)) => Err(eyre::eyre!("expected {kind}, got {} ({err})", err.kind())),
        Some(Ok(entry)) => Err(eyre::eyre!("expected {kind}, got success in state {}", entry.state())),
        None => Err(eyre::eyre!("no lifecycle operation was issued")),
    }
}

#[then(r#"the server "{id}" is "{state}""#)]
fn server_is_in_state(world: &SupervisorWorld, id: String, state: String) -> Result<(), eyre::Report> {
    let expected = ServerState::try_from(state.as_str()).map_err(|err| eyre::eyre!("{err}"))?;
    let entry = world
        .supervisor
        .status(&server_id(&id)?)
        .map_err(|err| eyre::eyre!("status failed: {err}"))?;
    if entry.state() != expected {
        return Err(eyre::eyre!("expected {expected}, found {}", entry.state()));
    }
    if expected == ServerState::Stopped && entry.runtime().pid().is_some() {
        return Err(eyre::eyre!("stopped server still records a pid"));
    }
    Ok(())
}

#[then(r#"no process is left for "{id}""#)]
fn no_process_left(world: &SupervisorWorld, id: String) -> Result<(), eyre::Report> {
    if world.host.is_alive(&server_id(&id)?) {
        return Err(eyre::eyre!("process for {id} is still alive"));
    }
    Ok(())
}

#[then("no process was spawned")]
fn no_process_spawned(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let spawned = world.host.spawn_count();
    if spawned != 0 {
        return Err(eyre::eyre!("expected no spawns, found {spawned}"));
    }
    Ok(())
}

#[then("the call succeeded")]
fn call_succeeded(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    match &world.last_call {
        Some(Ok(result)) if result.outcome == CallOutcome::Success => Ok(()),
        Some(Ok(result)) => Err(eyre::eyre!("expected success, got {}", result.outcome)),
        Some(Err(err)) => Err(eyre::eyre!("expected success, got {err}")),
        None => Err(eyre::eyre!("no call was made")),
    }
}

#[then(r#"the call failed with "{kind}""#)]
fn call_failed_with(world: &SupervisorWorld, kind: String) -> Result<(), eyre::Report> {
    match &world.last_call {
        Some(Err(err)) if err.kind().as_str() == kind => Ok(()),
        Some(Err(err)) => Err(eyre::eyre!("expected {kind}, got {} ({err})", err.kind())),
        Some(Ok(result)) => Err(eyre::eyre!("expected {kind}, got outcome {}", result.outcome)),
        None => Err(eyre::eyre!("no call was made")),
    }
}

#[then(r#"the call history holds one "{outcome}" record"#)]
fn history_holds_one_record(world: &SupervisorWorld, outcome: String) -> Result<(), eyre::Report> {
    let expected = CallOutcome::try_from(outcome.as_str()).map_err(|err| eyre::eyre!("{err}"))?;
    let records = run_async(world.router.history().recent(usize::MAX))
        .map_err(|err| eyre::eyre!("history read failed: {err}"))?;
    let outcomes: Vec<CallOutcome> = records.iter().map(|record| record.outcome()).collect();
    if outcomes != [expected] {
        return Err(eyre::eyre!("expected one {expected} record, found {outcomes:?}"));
    }
    Ok(())
}
