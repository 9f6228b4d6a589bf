//! Scripted in-memory transport.

use crate::registry::domain::ServerId;
use crate::transport::{
    domain::{CallEnvelope, CallResponse, TransportError, TransportResult},
    ports::{TransportClient, WorkerLink},
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Scripted behaviour of one tool.
#[derive(Debug, Clone)]
enum ToolScript {
    Respond(CallResponse),
    Delay(Duration, CallResponse),
    Break(String),
}

#[derive(Debug, Default)]
struct InMemoryTransportState {
    attached: HashSet<ServerId>,
    scripts: HashMap<(ServerId, String), ToolScript>,
    failing_pings: HashSet<ServerId>,
    stalled_handshakes: HashSet<ServerId>,
    sent: Vec<(ServerId, CallEnvelope)>,
}

/// Transport adapter that answers from scripts instead of real workers.
///
/// Unscripted tools answer with an empty successful result. Delays are
/// measured against the caller's timeout, so a delay longer than the
/// timeout produces [`TransportError::Timeout`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<RwLock<InMemoryTransportState>>,
}

impl InMemoryTransport {
    /// Creates a transport with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write_state<T>(&self, apply: impl FnOnce(&mut InMemoryTransportState) -> T) -> T {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        apply(&mut state)
    }

    fn read_state<T>(&self, inspect: impl FnOnce(&InMemoryTransportState) -> T) -> T {
        let state = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inspect(&state)
    }

    fn script(&self, server_id: &ServerId, tool_name: &str, script: ToolScript) {
        self.write_state(|state| {
            state
                .scripts
                .insert((server_id.clone(), tool_name.to_owned()), script);
        });
    }

    /// Makes a tool answer successfully with the given result.
    pub fn respond_with(&self, server_id: &ServerId, tool_name: &str, result: Value) {
        self.script(
            server_id,
            tool_name,
            ToolScript::Respond(CallResponse::from_result(result)),
        );
    }

    /// Makes a tool report a tool-level failure with a text message.
    pub fn fail_tool(&self, server_id: &ServerId, tool_name: &str, message: &str) {
        self.script(
            server_id,
            tool_name,
            ToolScript::Respond(CallResponse::tool_error(
                json!({"content": [{"type": "text", "text": message}], "isError": true}),
            )),
        );
    }

    /// Makes a tool answer only after `delay`.
    pub fn delay_tool(&self, server_id: &ServerId, tool_name: &str, delay: Duration, result: Value) {
        self.script(
            server_id,
            tool_name,
            ToolScript::Delay(delay, CallResponse::from_result(result)),
        );
    }

    /// Makes calls to a tool fail at the transport level.
    pub fn break_tool(&self, server_id: &ServerId, tool_name: &str, reason: &str) {
        self.script(server_id, tool_name, ToolScript::Break(reason.to_owned()));
    }

    /// Makes pings to a server fail, or succeed again.
    pub fn set_ping_failing(&self, server_id: &ServerId, failing: bool) {
        self.write_state(|state| {
            if failing {
                state.failing_pings.insert(server_id.clone());
            } else {
                state.failing_pings.remove(server_id);
            }
        });
    }

    /// Makes the handshake with a server never complete.
    pub fn stall_handshake(&self, server_id: &ServerId) {
        self.write_state(|state| {
            state.stalled_handshakes.insert(server_id.clone());
        });
    }

    /// Returns whether a link is attached for the server.
    #[must_use]
    pub fn is_attached(&self, server_id: &ServerId) -> bool {
        self.read_state(|state| state.attached.contains(server_id))
    }

    /// Returns every envelope dispatched so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<(ServerId, CallEnvelope)> {
        self.read_state(|state| state.sent.clone())
    }

    fn ensure_attached(&self, server_id: &ServerId) -> TransportResult<()> {
        if self.is_attached(server_id) {
            Ok(())
        } else {
            Err(TransportError::NotConnected(server_id.clone()))
        }
    }
}

fn timeout_error(server_id: &ServerId, timeout: Duration) -> TransportError {
    TransportError::Timeout {
        server_id: server_id.clone(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

#[async_trait]
impl TransportClient for InMemoryTransport {
    async fn attach(&self, server_id: &ServerId, _link: WorkerLink) -> TransportResult<()> {
        self.write_state(|state| {
            state.attached.insert(server_id.clone());
        });
        Ok(())
    }

    async fn handshake(&self, server_id: &ServerId, timeout: Duration) -> TransportResult<()> {
        self.ensure_attached(server_id)?;
        if self.read_state(|state| state.stalled_handshakes.contains(server_id)) {
            tokio::time::sleep(timeout).await;
            return Err(timeout_error(server_id, timeout));
        }
        Ok(())
    }

    async fn ping(&self, server_id: &ServerId, _timeout: Duration) -> TransportResult<()> {
        self.ensure_attached(server_id)?;
        if self.read_state(|state| state.failing_pings.contains(server_id)) {
            return Err(TransportError::ConnectionClosed(server_id.clone()));
        }
        Ok(())
    }

    async fn send(
        &self,
        server_id: &ServerId,
        envelope: &CallEnvelope,
        timeout: Duration,
    ) -> TransportResult<CallResponse> {
        self.ensure_attached(server_id)?;
        let script = self.write_state(|state| {
            state.sent.push((server_id.clone(), envelope.clone()));
            state
                .scripts
                .get(&(server_id.clone(), envelope.tool_name().to_owned()))
                .cloned()
        });

        match script {
            None => Ok(CallResponse::success(json!({"content": []}))),
            Some(ToolScript::Respond(response)) => Ok(response),
            Some(ToolScript::Break(reason)) => Err(TransportError::MalformedResponse {
                server_id: server_id.clone(),
                reason,
            }),
            Some(ToolScript::Delay(delay, response)) => {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(timeout_error(server_id, timeout));
                }
                tokio::time::sleep(delay).await;
                Ok(response)
            }
        }
    }

    async fn detach(&self, server_id: &ServerId) {
        self.write_state(|state| {
            state.attached.remove(server_id);
        });
    }
}
