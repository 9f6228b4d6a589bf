//! Tool call requests and their history records.

use super::CallOutcome;
use crate::transport::domain::{CallId, CallResponse};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use serde_json::Value;

/// A caller's request to run one tool on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    /// Target server id as the caller supplied it; the router validates it.
    pub server_id: String,
    /// Tool name as declared by the server.
    pub tool_name: String,
    /// Parameter object.
    pub parameters: Value,
}

impl ToolCallRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(server_id: impl Into<String>, tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            server_id: server_id.into(),
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// Result of a call the worker ran to completion.
///
/// A tool that reports failure still produces a result; its outcome is
/// [`CallOutcome::ToolFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallResult {
    /// Call identifier, also present in the history record.
    pub call_id: CallId,
    /// Either success or tool failure.
    pub outcome: CallOutcome,
    /// Worker response.
    pub response: CallResponse,
}

impl ToolCallResult {
    /// Wraps a worker response, classifying it by its error flag.
    #[must_use]
    pub const fn new(call_id: CallId, response: CallResponse) -> Self {
        let outcome = if response.is_error() {
            CallOutcome::ToolFailure
        } else {
            CallOutcome::Success
        };
        Self {
            call_id,
            outcome,
            response,
        }
    }
}

/// A call that has been accepted for processing but has no outcome yet.
///
/// Completing it is the only way to produce a [`ToolCallRecord`], so every
/// record carries a terminal outcome.
#[derive(Debug, Clone)]
pub struct PendingCall {
    call_id: CallId,
    server_id: String,
    tool_name: String,
    parameters: Value,
    requested_at: DateTime<Utc>,
}

impl PendingCall {
    /// Opens a call for a request, copying its parameters.
    #[must_use]
    pub fn open(request: &ToolCallRequest, clock: &impl Clock) -> Self {
        Self {
            call_id: CallId::new(),
            server_id: request.server_id.clone(),
            tool_name: request.tool_name.clone(),
            parameters: request.parameters.clone(),
            requested_at: clock.utc(),
        }
    }

    /// Returns the call identifier.
    #[must_use]
    pub const fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Closes the call with a result summary.
    #[must_use]
    pub fn succeed(self, outcome: CallOutcome, summary: String, clock: &impl Clock) -> ToolCallRecord {
        self.complete(outcome, Some(summary), None, clock)
    }

    /// Closes the call with an error description.
    #[must_use]
    pub fn fail(self, outcome: CallOutcome, detail: String, clock: &impl Clock) -> ToolCallRecord {
        self.complete(outcome, None, Some(detail), clock)
    }

    fn complete(
        self,
        outcome: CallOutcome,
        result_summary: Option<String>,
        error_detail: Option<String>,
        clock: &impl Clock,
    ) -> ToolCallRecord {
        ToolCallRecord {
            call_id: self.call_id,
            server_id: self.server_id,
            tool_name: self.tool_name,
            parameters: self.parameters,
            requested_at: self.requested_at,
            completed_at: clock.utc(),
            outcome,
            result_summary,
            error_detail,
        }
    }
}

/// Immutable history entry for one dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallRecord {
    call_id: CallId,
    server_id: String,
    tool_name: String,
    parameters: Value,
    requested_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    outcome: CallOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_detail: Option<String>,
}

impl ToolCallRecord {
    /// Returns the call identifier.
    #[must_use]
    pub const fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Returns the target server id as requested.
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the parameters as supplied.
    #[must_use]
    pub const fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Returns when the call was requested.
    #[must_use]
    pub const fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// Returns when the call reached its outcome.
    #[must_use]
    pub const fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Returns the terminal outcome.
    #[must_use]
    pub const fn outcome(&self) -> CallOutcome {
        self.outcome
    }

    /// Returns the result summary for completed calls.
    #[must_use]
    pub fn result_summary(&self) -> Option<&str> {
        self.result_summary.as_deref()
    }

    /// Returns the error description for failed calls.
    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }
}
