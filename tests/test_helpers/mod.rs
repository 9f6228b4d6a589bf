//! Server definitions shared by integration test crates.

use switchyard::registry::domain::{ServerDefinition, ServerId, ToolSpec};

/// Parses a server id that the test knows to be valid.
///
/// # Errors
///
/// Returns an error when the literal is not a valid server id.
pub fn server_id(value: &str) -> eyre::Result<ServerId> {
    ServerId::new(value).map_err(|err| eyre::eyre!("invalid server id {value}: {err}"))
}

/// Builds a stdio server exposing one tool that takes no parameters.
///
/// # Errors
///
/// Returns an error when the id or tool name is invalid.
pub fn server_with_tool(id: &str, tool: &str, executable: &str) -> eyre::Result<ServerDefinition> {
    let definition = ServerDefinition::stdio(server_id(id)?, format!("Server {id}"), executable)
        .map_err(|err| eyre::eyre!("invalid definition: {err}"))?;
    definition
        .with_tool(tool, ToolSpec::without_parameters())
        .map_err(|err| eyre::eyre!("invalid tool: {err}"))
}
