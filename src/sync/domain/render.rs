//! Rendering of registry definitions into client-specific entries.

use super::ClientKind;
use crate::registry::domain::{ServerDefinition, TransportKind};
use serde_json::{Map, Value, json};

/// Renders one server as the entry a client expects under its section.
#[must_use]
pub fn render_entry(kind: ClientKind, definition: &ServerDefinition) -> Value {
    match definition.transport_kind() {
        TransportKind::Stdio => render_stdio(kind, definition),
        TransportKind::Http => render_http(kind, definition.endpoint().unwrap_or_default()),
    }
}

fn render_stdio(kind: ClientKind, definition: &ServerDefinition) -> Value {
    let mut launch = Map::new();
    let command_key = if kind == ClientKind::Zed { "path" } else { "command" };
    launch.insert(command_key.to_owned(), json!(definition.executable_path().as_str()));
    launch.insert("args".to_owned(), json!(definition.launch_args()));
    if !definition.env().is_empty() {
        launch.insert("env".to_owned(), json!(definition.env()));
    }

    match kind {
        ClientKind::Zed => json!({ "command": launch }),
        ClientKind::Vscode => {
            let mut entry = Map::new();
            entry.insert("type".to_owned(), json!("stdio"));
            entry.extend(launch);
            Value::Object(entry)
        }
        ClientKind::ClaudeDesktop | ClientKind::Cursor | ClientKind::Windsurf | ClientKind::Custom => {
            Value::Object(launch)
        }
    }
}

fn render_http(kind: ClientKind, endpoint: &str) -> Value {
    match kind {
        ClientKind::Windsurf => json!({ "serverUrl": endpoint }),
        ClientKind::Vscode => json!({ "type": "http", "url": endpoint }),
        ClientKind::ClaudeDesktop | ClientKind::Cursor | ClientKind::Zed | ClientKind::Custom => {
            json!({ "url": endpoint })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::domain::ServerId;
    use rstest::{fixture, rstest};

    #[fixture]
    fn stdio_definition() -> ServerDefinition {
        ServerDefinition::stdio(ServerId::new("files").expect("valid id"), "Files", "/opt/files/server")
            .expect("valid definition")
            .with_args(["--root".to_owned(), "/srv".to_owned()])
            .with_env([("LOG".to_owned(), "debug".to_owned())])
    }

    #[fixture]
    fn http_definition() -> ServerDefinition {
        ServerDefinition::http(
            ServerId::new("search").expect("valid id"),
            "Search",
            "/opt/search/server",
            "http://127.0.0.1:8080/mcp",
        )
        .expect("valid definition")
    }

    #[rstest]
    #[case(ClientKind::ClaudeDesktop)]
    #[case(ClientKind::Cursor)]
    #[case(ClientKind::Windsurf)]
    #[case(ClientKind::Custom)]
    fn stdio_entries_use_command_args_env(stdio_definition: ServerDefinition, #[case] kind: ClientKind) {
        assert_eq!(
            render_entry(kind, &stdio_definition),
            json!({"command": "/opt/files/server", "args": ["--root", "/srv"], "env": {"LOG": "debug"}})
        );
    }

    #[rstest]
    fn vscode_entries_carry_a_type(stdio_definition: ServerDefinition, http_definition: ServerDefinition) {
        assert_eq!(
            render_entry(ClientKind::Vscode, &stdio_definition),
            json!({"type": "stdio", "command": "/opt/files/server", "args": ["--root", "/srv"], "env": {"LOG": "debug"}})
        );
        assert_eq!(
            render_entry(ClientKind::Vscode, &http_definition),
            json!({"type": "http", "url": "http://127.0.0.1:8080/mcp"})
        );
    }

    #[rstest]
    fn zed_entries_nest_the_command(stdio_definition: ServerDefinition) {
        assert_eq!(
            render_entry(ClientKind::Zed, &stdio_definition),
            json!({"command": {"path": "/opt/files/server", "args": ["--root", "/srv"], "env": {"LOG": "debug"}}})
        );
    }

    #[rstest]
    #[case(ClientKind::Windsurf, json!({"serverUrl": "http://127.0.0.1:8080/mcp"}))]
    #[case(ClientKind::Cursor, json!({"url": "http://127.0.0.1:8080/mcp"}))]
    fn http_entries_use_the_client_url_key(
        http_definition: ServerDefinition,
        #[case] kind: ClientKind,
        #[case] expected: Value,
    ) {
        assert_eq!(render_entry(kind, &http_definition), expected);
    }

    #[rstest]
    fn empty_env_is_omitted() {
        let definition = ServerDefinition::stdio(ServerId::new("bare").expect("valid id"), "Bare", "/bin/bare")
            .expect("valid definition");

        assert_eq!(
            render_entry(ClientKind::Cursor, &definition),
            json!({"command": "/bin/bare", "args": []})
        );
    }
}
