//! Identifier types for registered servers.

use super::RegistryDomainError;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;

/// Maximum length for a server identifier.
const MAX_SERVER_ID_LENGTH: usize = 128;

/// Number of digest bytes appended to path-derived identifiers.
const PATH_DIGEST_BYTES: usize = 4;

/// Stable identifier of a server definition.
///
/// Identifiers are case-sensitive and restricted to `[A-Za-z0-9._-]` so they
/// can be used verbatim as keys in client configuration files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    /// Creates a validated server identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryDomainError`] when the value is empty, too long, or
    /// contains unsupported characters.
    pub fn new(value: impl Into<String>) -> Result<Self, RegistryDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(RegistryDomainError::EmptyServerId);
        }

        let is_valid = normalized
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-'));
        if !is_valid {
            return Err(RegistryDomainError::InvalidServerId(normalized));
        }

        if normalized.len() > MAX_SERVER_ID_LENGTH {
            return Err(RegistryDomainError::ServerIdTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Derives a stable identifier from the location a server was discovered
    /// at.
    ///
    /// The identifier is the slugged final path component followed by the
    /// first eight hex characters of the SHA-256 digest of the full path, so
    /// two directories with the same name never collide.
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Self {
        let stem = path
            .file_name()
            .map(slugify)
            .filter(|slug| !slug.is_empty())
            .unwrap_or_else(|| "server".to_owned());

        let digest = Sha256::digest(path.as_str().as_bytes());
        let mut suffix = String::with_capacity(PATH_DIGEST_BYTES * 2);
        for byte in digest.iter().take(PATH_DIGEST_BYTES) {
            // Writing to a String cannot fail.
            let _ignored = write!(suffix, "{byte:02x}");
        }

        let max_stem = MAX_SERVER_ID_LENGTH - suffix.len() - 1;
        let truncated: String = stem.chars().take(max_stem).collect();
        Self(format!("{truncated}-{suffix}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut previous_dash = false;
    for character in value.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '.' | '_') {
            slug.push(character.to_ascii_lowercase());
            previous_dash = false;
        } else if !previous_dash {
            slug.push('-');
            previous_dash = true;
        }
    }
    slug.trim_matches('-').to_owned()
}

impl TryFrom<String> for ServerId {
    type Error = RegistryDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerId> for String {
    fn from(value: ServerId) -> Self {
        value.0
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
