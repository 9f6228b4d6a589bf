//! Tool execution router service.
//!
//! Every call gets exactly one history record, whatever its outcome. The
//! router never retries and never starts servers on demand.

use crate::error::ErrorKind;
use crate::registry::{
    domain::{ServerId, ServerState, StateChange},
    services::{RegistryError, ServerRegistry},
};
use crate::router::{
    domain::{
        CallOutcome, FieldViolation, PendingCall, RouterConfig, ToolCallRecord, ToolCallRequest,
        ToolCallResult, validate_parameters,
    },
    ports::{CallHistory, CallHistoryError},
};
use crate::transport::{
    domain::{CallEnvelope, CallId, CallResponse, TransportError},
    ports::TransportClient,
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest result summary or error detail kept in a record, in characters.
const SUMMARY_LIMIT: usize = 512;

/// Service-level errors for routed calls.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Registry lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The requested server id is not a valid identifier.
    #[error("call {call_id}: invalid server id `{server_id}`: {reason}")]
    InvalidServerId {
        /// Call identifier.
        call_id: CallId,
        /// Requested server id, as supplied.
        server_id: String,
        /// Why the id was refused.
        reason: String,
    },

    /// No server is registered under the identifier.
    #[error("call {call_id}: unknown server {server_id}")]
    UnknownServer {
        /// Call identifier.
        call_id: CallId,
        /// Requested server.
        server_id: ServerId,
    },

    /// The server exists but is not accepting calls.
    #[error("call {call_id}: server {server_id} is {state}, not running")]
    ServerNotReady {
        /// Call identifier.
        call_id: CallId,
        /// Requested server.
        server_id: ServerId,
        /// Observed lifecycle state.
        state: ServerState,
    },

    /// The server does not declare the tool.
    #[error("call {call_id}: server {server_id} has no tool {tool_name}")]
    UnknownTool {
        /// Call identifier.
        call_id: CallId,
        /// Requested server.
        server_id: ServerId,
        /// Requested tool.
        tool_name: String,
    },

    /// Parameters violated the tool schema.
    #[error("call {call_id}: invalid parameters for {tool_name}: {}", format_violations(.violations))]
    Validation {
        /// Call identifier.
        call_id: CallId,
        /// Requested tool.
        tool_name: String,
        /// Every violation found.
        violations: Vec<FieldViolation>,
    },

    /// Dispatch failed or timed out.
    #[error("call {call_id}: {source}")]
    Transport {
        /// Call identifier.
        call_id: CallId,
        /// Transport failure.
        source: TransportError,
    },

    /// The server stopped while the call was in flight.
    #[error("call {call_id}: server {server_id} became {state} while the call was in flight")]
    ServerLeft {
        /// Call identifier.
        call_id: CallId,
        /// Target server.
        server_id: ServerId,
        /// State the server moved to.
        state: ServerState,
    },

    /// The caller cancelled the call.
    #[error("call {call_id} was cancelled")]
    Cancelled {
        /// Call identifier.
        call_id: CallId,
    },

    /// The call record could not be stored.
    #[error(transparent)]
    History(#[from] CallHistoryError),
}

impl RouterError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Registry(err) => err.kind(),
            Self::InvalidServerId { .. } | Self::UnknownServer { .. } => ErrorKind::UnknownServer,
            Self::ServerNotReady { .. } => ErrorKind::ServerNotReady,
            Self::UnknownTool { .. } => ErrorKind::UnknownTool,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Transport { source, .. } => source.kind(),
            Self::ServerLeft { .. } => ErrorKind::TransportError,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::History(_) => ErrorKind::Internal,
        }
    }

    /// Returns the outcome recorded for a call that failed this way.
    #[must_use]
    pub const fn outcome(&self) -> CallOutcome {
        match self {
            Self::Validation { .. } => CallOutcome::ValidationError,
            Self::Transport { source, .. } if source.is_timeout() => CallOutcome::Timeout,
            Self::Transport { .. } | Self::ServerLeft { .. } => CallOutcome::TransportError,
            Self::Cancelled { .. } => CallOutcome::Cancelled,
            Self::Registry(_)
            | Self::InvalidServerId { .. }
            | Self::UnknownServer { .. }
            | Self::ServerNotReady { .. }
            | Self::UnknownTool { .. }
            | Self::History(_) => CallOutcome::Rejected,
        }
    }

    /// Returns the identifier of the call, when one was assigned.
    #[must_use]
    pub const fn call_id(&self) -> Option<CallId> {
        match self {
            Self::InvalidServerId { call_id, .. }
            | Self::UnknownServer { call_id, .. }
            | Self::ServerNotReady { call_id, .. }
            | Self::UnknownTool { call_id, .. }
            | Self::Validation { call_id, .. }
            | Self::Transport { call_id, .. }
            | Self::ServerLeft { call_id, .. }
            | Self::Cancelled { call_id } => Some(*call_id),
            Self::Registry(_) | Self::History(_) => None,
        }
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// States in which an in-flight call can no longer be answered.
const fn has_departed(state: ServerState) -> bool {
    matches!(
        state,
        ServerState::Stopping | ServerState::Crashed | ServerState::Stopped
    )
}

fn truncate(text: String) -> String {
    match text.char_indices().nth(SUMMARY_LIMIT) {
        Some((cut, _)) => {
            let mut shortened = text;
            shortened.truncate(cut);
            shortened.push('…');
            shortened
        }
        None => text,
    }
}

fn summarize(response: &CallResponse) -> String {
    truncate(
        response
            .text()
            .unwrap_or_else(|| response.content().to_string()),
    )
}

/// Validates and dispatches tool calls to running servers.
pub struct ToolExecutionRouter<T, R, C>
where
    T: TransportClient,
    R: CallHistory,
    C: Clock + Send + Sync,
{
    registry: Arc<ServerRegistry>,
    transport: Arc<T>,
    history: Arc<R>,
    clock: Arc<C>,
    config: RouterConfig,
}

impl<T, R, C> ToolExecutionRouter<T, R, C>
where
    T: TransportClient,
    R: CallHistory,
    C: Clock + Send + Sync,
{
    /// Creates a router.
    #[must_use]
    pub const fn new(
        registry: Arc<ServerRegistry>,
        transport: Arc<T>,
        history: Arc<R>,
        clock: Arc<C>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            history,
            clock,
            config,
        }
    }

    /// Returns the router settings.
    #[must_use]
    pub const fn config(&self) -> RouterConfig {
        self.config
    }

    /// Returns the call history.
    #[must_use]
    pub fn history(&self) -> &R {
        &self.history
    }

    /// Runs one tool call to a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] when the call is rejected, fails validation,
    /// fails in transport or times out. A tool that runs and reports failure
    /// is not an error; see [`ToolCallResult::outcome`].
    pub async fn execute(&self, request: ToolCallRequest) -> RouterResult<ToolCallResult> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Runs one tool call, abandoning it if `cancel` fires first.
    ///
    /// Cancellation stops waiting for the reply; the worker may still run
    /// the tool.
    ///
    /// # Errors
    ///
    /// As for [`Self::execute`], plus [`RouterError::Cancelled`].
    pub async fn execute_with_cancel(
        &self,
        request: ToolCallRequest,
        cancel: &CancellationToken,
    ) -> RouterResult<ToolCallResult> {
        let pending = PendingCall::open(&request, &*self.clock);
        let result = self.dispatch(pending.call_id(), request, cancel).await;
        let record = match &result {
            Ok(done) if done.response.is_error() => pending.fail(
                CallOutcome::ToolFailure,
                summarize(&done.response),
                &*self.clock,
            ),
            Ok(done) => pending.succeed(CallOutcome::Success, summarize(&done.response), &*self.clock),
            Err(err) => pending.fail(err.outcome(), truncate(err.to_string()), &*self.clock),
        };
        log_completion(&record);
        self.history.append(record).await?;
        result
    }

    async fn dispatch(
        &self,
        call_id: CallId,
        request: ToolCallRequest,
        cancel: &CancellationToken,
    ) -> RouterResult<ToolCallResult> {
        let ToolCallRequest {
            server_id: requested,
            tool_name,
            parameters,
        } = request;
        let server_id = match ServerId::new(requested.as_str()) {
            Ok(server_id) => server_id,
            Err(err) => {
                return Err(RouterError::InvalidServerId {
                    call_id,
                    server_id: requested,
                    reason: err.to_string(),
                });
            }
        };
        let mut changes = self.registry.subscribe();

        let Some(entry) = self.registry.get(&server_id)? else {
            return Err(RouterError::UnknownServer { call_id, server_id });
        };
        let state = entry.state();
        if !state.accepts_calls() {
            return Err(RouterError::ServerNotReady {
                call_id,
                server_id,
                state,
            });
        }
        let Some(tool) = entry.definition().tool(&tool_name) else {
            return Err(RouterError::UnknownTool {
                call_id,
                server_id,
                tool_name,
            });
        };
        if let Err(violations) = validate_parameters(tool.input_schema(), &parameters) {
            return Err(RouterError::Validation {
                call_id,
                tool_name,
                violations,
            });
        }
        if cancel.is_cancelled() {
            return Err(RouterError::Cancelled { call_id });
        }

        let timeout = self.config.call_timeout();
        let envelope = CallEnvelope::new(call_id, tool_name, parameters);
        debug!(%call_id, %server_id, tool = envelope.tool_name(), "dispatching tool call");
        let send = tokio::time::timeout(
            timeout,
            self.transport.send(&server_id, &envelope, timeout),
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RouterError::Cancelled { call_id }),
            departed = self.await_departure(&mut changes, &server_id) => Err(RouterError::ServerLeft {
                call_id,
                server_id: server_id.clone(),
                state: departed,
            }),
            sent = send => match sent {
                Ok(Ok(response)) => Ok(ToolCallResult::new(call_id, response)),
                Ok(Err(source)) => Err(RouterError::Transport { call_id, source }),
                Err(_elapsed) => Err(RouterError::Transport {
                    call_id,
                    source: TransportError::Timeout {
                        server_id: server_id.clone(),
                        timeout_ms: millis(timeout),
                    },
                }),
            },
        }
    }

    /// Resolves once the server can no longer answer a call.
    async fn await_departure(
        &self,
        changes: &mut broadcast::Receiver<StateChange>,
        server_id: &ServerId,
    ) -> ServerState {
        loop {
            match changes.recv().await {
                Ok(change) if &change.server_id == server_id && has_departed(change.to) => {
                    return change.to;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(%server_id, skipped, "state change stream lagged; re-reading registry");
                    match self.registry.get(server_id) {
                        Ok(Some(entry)) if has_departed(entry.state()) => return entry.state(),
                        Ok(None) => return ServerState::Stopped,
                        Ok(Some(_)) | Err(_) => {}
                    }
                }
                Err(RecvError::Closed) => return std::future::pending().await,
            }
        }
    }
}

fn log_completion(record: &ToolCallRecord) {
    let elapsed_ms = (record.completed_at() - record.requested_at()).num_milliseconds();
    match record.outcome() {
        CallOutcome::Success => info!(
            call_id = %record.call_id(),
            server_id = %record.server_id(),
            tool = record.tool_name(),
            elapsed_ms,
            "tool call succeeded"
        ),
        CallOutcome::ToolFailure | CallOutcome::ValidationError | CallOutcome::Rejected | CallOutcome::Cancelled => info!(
            call_id = %record.call_id(),
            server_id = %record.server_id(),
            tool = record.tool_name(),
            outcome = %record.outcome(),
            elapsed_ms,
            detail = record.error_detail().unwrap_or_default(),
            "tool call did not succeed"
        ),
        CallOutcome::TransportError | CallOutcome::Timeout => warn!(
            call_id = %record.call_id(),
            server_id = %record.server_id(),
            tool = record.tool_name(),
            outcome = %record.outcome(),
            elapsed_ms,
            detail = record.error_detail().unwrap_or_default(),
            "tool call failed in transport"
        ),
    }
}
