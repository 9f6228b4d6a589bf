//! Given steps for process supervisor BDD scenarios.

use super::world::{SupervisorWorld, run_async};
use crate::test_helpers::{server_id, server_with_tool};
use eyre::WrapErr;
use mockable::DefaultClock;
use rstest_bdd_macros::given;

#[given(r#"a registered server "{id}" with tool "{tool}""#)]
fn a_registered_server(world: &mut SupervisorWorld, id: String, tool: String) -> Result<(), eyre::Report> {
    let definition = server_with_tool(&id, &tool, &format!("/opt/{id}/bin/server"))?;
    world
        .registry
        .insert(definition, &DefaultClock)
        .wrap_err("register server for scenario")?;
    Ok(())
}

#[given(r#"the server "{id}" cannot be spawned"#)]
fn server_cannot_be_spawned(world: &mut SupervisorWorld, id: String) -> Result<(), eyre::Report> {
    world.host.make_unspawnable(&server_id(&id)?);
    Ok(())
}

#[given(r#"the server "{id}" has been started"#)]
fn server_has_been_started(world: &mut SupervisorWorld, id: String) -> Result<(), eyre::Report> {
    run_async(world.supervisor.start(&server_id(&id)?)).wrap_err("start server for scenario")?;
    Ok(())
}
