//! Terminal outcome of a routed call.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How a tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallOutcome {
    /// The worker ran the tool and returned a result.
    Success,
    /// The worker ran the tool and the tool reported failure.
    ToolFailure,
    /// The call never reached a worker: unknown server or tool, or the
    /// server was not running.
    Rejected,
    /// Parameters violated the tool schema.
    ValidationError,
    /// Dispatch failed at the transport level.
    TransportError,
    /// The worker did not answer within the call bound.
    Timeout,
    /// The caller stopped waiting.
    Cancelled,
}

impl CallOutcome {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ToolFailure => "tool-failure",
            Self::Rejected => "rejected",
            Self::ValidationError => "validation-error",
            Self::TransportError => "transport-error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown call outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown call outcome: {0}")]
pub struct ParseCallOutcomeError(pub String);

impl TryFrom<&str> for CallOutcome {
    type Error = ParseCallOutcomeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "success" => Ok(Self::Success),
            "tool-failure" => Ok(Self::ToolFailure),
            "rejected" => Ok(Self::Rejected),
            "validation-error" => Ok(Self::ValidationError),
            "transport-error" => Ok(Self::TransportError),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseCallOutcomeError(value.to_owned())),
        }
    }
}
