//! When steps for process supervisor BDD scenarios.

use super::world::{SupervisorWorld, run_async};
use crate::test_helpers::server_id;
use rstest_bdd_macros::when;
use serde_json::json;
use switchyard::router::domain::ToolCallRequest;

#[when(r#"the server "{id}" is started"#)]
fn server_is_started(world: &mut SupervisorWorld, id: String) -> Result<(), eyre::Report> {
    let result = run_async(world.supervisor.start(&server_id(&id)?));
    world.lifecycle_results.push(result);
    Ok(())
}

#[when(r#"the server "{id}" is stopped"#)]
fn server_is_stopped(world: &mut SupervisorWorld, id: String) -> Result<(), eyre::Report> {
    let result = run_async(world.supervisor.stop(&server_id(&id)?));
    world.lifecycle_results.push(result);
    Ok(())
}

#[when(r#"the tool "{tool}" is called on "{id}" with no parameters"#)]
fn tool_is_called(world: &mut SupervisorWorld, tool: String, id: String) -> Result<(), eyre::Report> {
    let request = ToolCallRequest::new(server_id(&id)?, tool, json!({}));
    world.last_call = Some(run_async(world.router.execute(request)));
    Ok(())
}
