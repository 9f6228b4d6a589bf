//! Server definition value objects.

use super::{ParseTransportKindError, RegistryDomainError, ServerId};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Channel used to reach a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Line-delimited JSON-RPC over the child's stdin/stdout.
    Stdio,
    /// JSON-RPC over HTTP to an endpoint the worker listens on.
    Http,
}

impl TransportKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransportKind {
    type Error = ParseTransportKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            _ => Err(ParseTransportKindError(value.to_owned())),
        }
    }
}

/// Declared metadata for a tool exposed by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default = "empty_object_schema", alias = "inputSchema")]
    input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolSpec {
    /// Creates a tool specification with a parameter schema.
    #[must_use]
    pub const fn new(input_schema: Value) -> Self {
        Self {
            description: None,
            input_schema,
        }
    }

    /// Creates a tool that accepts an empty parameter object.
    #[must_use]
    pub fn without_parameters() -> Self {
        Self::new(empty_object_schema())
    }

    /// Sets a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let normalized = description.into().trim().to_owned();
        self.description = (!normalized.is_empty()).then_some(normalized);
        self
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the JSON-schema-like parameter specification.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// Identity unit discovered on disk.
///
/// A definition never changes after construction; rediscovery produces a new
/// value that replaces the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDefinition {
    id: ServerId,
    display_name: String,
    executable_path: Utf8PathBuf,
    launch_args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<Utf8PathBuf>,
    declared_tools: BTreeMap<String, ToolSpec>,
    transport_kind: TransportKind,
    endpoint: Option<String>,
}

impl ServerDefinition {
    /// Creates a definition for a worker reached over stdio.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError`] when the display name or executable
    /// path is empty.
    pub fn stdio(
        id: ServerId,
        display_name: impl Into<String>,
        executable_path: impl Into<Utf8PathBuf>,
    ) -> Result<Self, RegistryDomainError> {
        Self::build(id, display_name.into(), executable_path.into(), TransportKind::Stdio, None)
    }

    /// Creates a definition for a worker reached over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError`] when the display name or executable
    /// path is empty, or the endpoint is not an `http(s)://` URL.
    pub fn http(
        id: ServerId,
        display_name: impl Into<String>,
        executable_path: impl Into<Utf8PathBuf>,
        endpoint: impl Into<String>,
    ) -> Result<Self, RegistryDomainError> {
        let normalized_endpoint = endpoint.into().trim().to_owned();
        let has_valid_prefix = normalized_endpoint.starts_with("http://")
            || normalized_endpoint.starts_with("https://");
        if !has_valid_prefix {
            return Err(RegistryDomainError::InvalidEndpoint(normalized_endpoint));
        }

        Self::build(
            id,
            display_name.into(),
            executable_path.into(),
            TransportKind::Http,
            Some(normalized_endpoint),
        )
    }

    fn build(
        id: ServerId,
        display_name: String,
        executable_path: Utf8PathBuf,
        transport_kind: TransportKind,
        endpoint: Option<String>,
    ) -> Result<Self, RegistryDomainError> {
        let normalized_name = display_name.trim().to_owned();
        if normalized_name.is_empty() {
            return Err(RegistryDomainError::EmptyDisplayName);
        }
        if executable_path.as_str().trim().is_empty() {
            return Err(RegistryDomainError::EmptyExecutablePath);
        }

        Ok(Self {
            id,
            display_name: normalized_name,
            executable_path,
            launch_args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            declared_tools: BTreeMap::new(),
            transport_kind,
            endpoint,
        })
    }

    /// Replaces the ordered launch arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.launch_args = values.into_iter().collect();
        self
    }

    /// Replaces process environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets the working directory the process is launched in.
    #[must_use]
    pub fn with_working_directory(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.working_directory = Some(value.into());
        self
    }

    /// Declares a tool exposed by the server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError::EmptyToolName`] when the name is empty
    /// after trimming.
    pub fn with_tool(
        mut self,
        name: impl Into<String>,
        spec: ToolSpec,
    ) -> Result<Self, RegistryDomainError> {
        let normalized = name.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(RegistryDomainError::EmptyToolName);
        }
        self.declared_tools.insert(normalized, spec);
        Ok(self)
    }

    /// Returns the server identifier.
    #[must_use]
    pub const fn id(&self) -> &ServerId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the executable path.
    #[must_use]
    pub fn executable_path(&self) -> &Utf8Path {
        &self.executable_path
    }

    /// Returns the ordered launch arguments.
    #[must_use]
    pub fn launch_args(&self) -> &[String] {
        &self.launch_args
    }

    /// Returns environment variables for the process.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&Utf8Path> {
        self.working_directory.as_deref()
    }

    /// Returns every declared tool keyed by name.
    #[must_use]
    pub const fn declared_tools(&self) -> &BTreeMap<String, ToolSpec> {
        &self.declared_tools
    }

    /// Looks up a declared tool by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.declared_tools.get(name)
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    /// Returns the HTTP endpoint for `http` workers.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}
