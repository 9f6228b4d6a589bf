//! Client identities, kinds and profiles.

use super::{ParseClientKindError, SyncDomainError};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a configured client, such as `claude-desktop`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Creates a validated client identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError`] when the value is empty or contains
    /// characters outside `[A-Za-z0-9._-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(SyncDomainError::EmptyClientId);
        }
        let is_valid = normalized
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-'));
        if !is_valid {
            return Err(SyncDomainError::InvalidClientId(normalized));
        }
        Ok(Self(normalized))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = SyncDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientId> for String {
    fn from(value: ClientId) -> Self {
        value.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Supported client applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// Claude Desktop (`mcpServers`).
    ClaudeDesktop,
    /// Cursor (`mcpServers`).
    Cursor,
    /// Windsurf (`mcpServers`, HTTP entries use `serverUrl`).
    Windsurf,
    /// Visual Studio Code (`servers`, entries carry a `type`).
    Vscode,
    /// Zed (`context_servers`, command object form).
    Zed,
    /// Any other client; the section path must be given explicitly.
    Custom,
}

impl ClientKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeDesktop => "claude_desktop",
            Self::Cursor => "cursor",
            Self::Windsurf => "windsurf",
            Self::Vscode => "vscode",
            Self::Zed => "zed",
            Self::Custom => "custom",
        }
    }

    /// Returns the key holding server registrations, or `None` for custom
    /// clients.
    #[must_use]
    pub const fn default_section(self) -> Option<&'static str> {
        match self {
            Self::ClaudeDesktop | Self::Cursor | Self::Windsurf => Some("mcpServers"),
            Self::Vscode => Some("servers"),
            Self::Zed => Some("context_servers"),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ClientKind {
    type Error = ParseClientKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "claude_desktop" => Ok(Self::ClaudeDesktop),
            "cursor" => Ok(Self::Cursor),
            "windsurf" => Ok(Self::Windsurf),
            "vscode" => Ok(Self::Vscode),
            "zed" => Ok(Self::Zed),
            "custom" => Ok(Self::Custom),
            _ => Err(ParseClientKindError(value.to_owned())),
        }
    }
}

/// Dotted location of the server-registration object inside a document,
/// such as `mcp.servers`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionPath(Vec<String>);

impl SectionPath {
    /// Parses a dotted path.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidSectionPath`] when the path or any
    /// segment is empty.
    pub fn parse(value: &str) -> Result<Self, SyncDomainError> {
        let segments: Vec<String> = value.trim().split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(SyncDomainError::InvalidSectionPath(value.to_owned()));
        }
        Ok(Self(segments))
    }

    /// Returns the path segments, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0.join("."))
    }
}

/// One client configuration file managed by the synchroniser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    id: ClientId,
    kind: ClientKind,
    path: Utf8PathBuf,
    section: SectionPath,
}

impl ClientProfile {
    /// Creates a profile.
    ///
    /// `section` overrides the kind's default section path and is required
    /// for [`ClientKind::Custom`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError`] when the section path is missing or
    /// invalid.
    pub fn new(
        id: ClientId,
        kind: ClientKind,
        path: impl Into<Utf8PathBuf>,
        section: Option<&str>,
    ) -> Result<Self, SyncDomainError> {
        let raw_section = section
            .or_else(|| kind.default_section())
            .ok_or_else(|| SyncDomainError::MissingSectionPath(id.to_string()))?;
        Ok(Self {
            section: SectionPath::parse(raw_section)?,
            id,
            kind,
            path: path.into(),
        })
    }

    /// Returns the client identifier.
    #[must_use]
    pub const fn id(&self) -> &ClientId {
        &self.id
    }

    /// Returns the client kind.
    #[must_use]
    pub const fn kind(&self) -> ClientKind {
        self.kind
    }

    /// Returns the configuration file location.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the server-registration section path.
    #[must_use]
    pub const fn section(&self) -> &SectionPath {
        &self.section
    }

    /// Returns where the pre-write content is copied before a replace.
    #[must_use]
    pub fn backup_path(&self, suffix: &str) -> Utf8PathBuf {
        let mut name = self.path.file_name().unwrap_or("config").to_owned();
        name.push('.');
        name.push_str(suffix);
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn client_id() -> ClientId {
        ClientId::new("editor").expect("valid id")
    }

    #[rstest]
    #[case(ClientKind::ClaudeDesktop, "mcpServers")]
    #[case(ClientKind::Windsurf, "mcpServers")]
    #[case(ClientKind::Vscode, "servers")]
    #[case(ClientKind::Zed, "context_servers")]
    fn profile_uses_the_kind_default_section(#[case] kind: ClientKind, #[case] expected: &str) {
        let profile = ClientProfile::new(client_id(), kind, "/tmp/config.json", None).expect("valid profile");

        assert_eq!(profile.section().to_string(), expected);
    }

    #[rstest]
    fn custom_kind_requires_a_section() {
        let error = ClientProfile::new(client_id(), ClientKind::Custom, "/tmp/config.json", None)
            .expect_err("custom without section");

        assert_eq!(error, SyncDomainError::MissingSectionPath("editor".to_owned()));
    }

    #[rstest]
    fn custom_section_is_split_on_dots() {
        let profile = ClientProfile::new(
            client_id(),
            ClientKind::Custom,
            "/tmp/config.json",
            Some("tools.mcp.servers"),
        )
        .expect("valid profile");

        assert_eq!(profile.section().segments(), ["tools", "mcp", "servers"]);
    }

    #[rstest]
    #[case("")]
    #[case("mcp..servers")]
    #[case(".servers")]
    fn rejects_empty_section_segments(#[case] raw: &str) {
        assert!(SectionPath::parse(raw).is_err());
    }

    #[rstest]
    #[case(" Claude-Desktop ", ClientKind::ClaudeDesktop)]
    #[case("VSCODE", ClientKind::Vscode)]
    #[case("zed", ClientKind::Zed)]
    fn parses_client_kinds(#[case] raw: &str, #[case] expected: ClientKind) {
        assert_eq!(ClientKind::try_from(raw), Ok(expected));
    }

    #[rstest]
    fn backup_sits_next_to_the_file() {
        let profile = ClientProfile::new(client_id(), ClientKind::Cursor, "/home/me/.cursor/mcp.json", None)
            .expect("valid profile");

        assert_eq!(profile.backup_path("bak"), Utf8PathBuf::from("/home/me/.cursor/mcp.json.bak"));
    }

    #[rstest]
    #[case("")]
    #[case("my editor")]
    fn rejects_invalid_client_ids(#[case] raw: &str) {
        assert!(ClientId::new(raw).is_err());
    }
}
