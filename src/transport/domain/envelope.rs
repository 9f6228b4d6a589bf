//! Call envelopes exchanged with workers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one dispatched tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Creates a new random call identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a call identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Request carried to a worker: which tool, with which parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallEnvelope {
    call_id: CallId,
    tool_name: String,
    parameters: Value,
}

impl CallEnvelope {
    /// Creates an envelope.
    #[must_use]
    pub fn new(call_id: CallId, tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            call_id,
            tool_name: tool_name.into(),
            parameters,
        }
    }

    /// Returns the call identifier.
    #[must_use]
    pub const fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the parameters.
    #[must_use]
    pub const fn parameters(&self) -> &Value {
        &self.parameters
    }
}

/// Result payload returned by a worker for a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallResponse {
    content: Value,
    is_error: bool,
}

impl CallResponse {
    /// Creates a successful response.
    #[must_use]
    pub const fn success(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Creates a response for a tool that ran and reported failure.
    #[must_use]
    pub const fn tool_error(content: Value) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// Interprets a `tools/call` result object.
    ///
    /// The `isError` flag marks a tool-level failure; its absence means
    /// success.
    #[must_use]
    pub fn from_result(result: Value) -> Self {
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            content: result,
            is_error,
        }
    }

    /// Returns the raw result payload.
    #[must_use]
    pub const fn content(&self) -> &Value {
        &self.content
    }

    /// Returns whether the tool reported failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_error
    }

    /// Returns the concatenated text blocks of the result, if any.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        let blocks = self.content.get("content")?.as_array()?;
        let texts: Vec<&str> = blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();
        (!texts.is_empty()).then(|| texts.join("\n"))
    }
}
