//! Production transport speaking JSON-RPC to attached workers.

use super::{HttpConnection, StdioConnection};
use crate::registry::domain::ServerId;
use crate::transport::{
    domain::{
        CallEnvelope, CallResponse, INITIALIZED_NOTIFICATION, METHOD_INITIALIZE, METHOD_PING,
        METHOD_TOOLS_CALL, TransportError, TransportResult, initialize_params, tool_call_params,
    },
    ports::{TransportClient, WorkerLink},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
enum Connection {
    Stdio(StdioConnection),
    Http(HttpConnection),
}

impl Connection {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> TransportResult<Value> {
        match self {
            Self::Stdio(connection) => connection.request(method, params, timeout).await,
            Self::Http(connection) => connection.request(method, params, timeout).await,
        }
    }

    async fn notify(&self, method: &str, timeout: Duration) -> TransportResult<()> {
        match self {
            Self::Stdio(connection) => connection.notify(method, None).await,
            Self::Http(connection) => connection.notify(method, None, timeout).await,
        }
    }
}

/// Transport multiplexing one JSON-RPC connection per server.
#[derive(Debug, Clone, Default)]
pub struct JsonRpcTransport {
    connections: Arc<RwLock<HashMap<ServerId, Arc<Connection>>>>,
    http: reqwest::Client,
}

impl JsonRpcTransport {
    /// Creates a transport with no attached connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a connection is attached for the server.
    #[must_use]
    pub fn is_attached(&self, server_id: &ServerId) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(server_id)
    }

    fn connection(&self, server_id: &ServerId) -> TransportResult<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(server_id)
            .cloned()
            .ok_or_else(|| TransportError::NotConnected(server_id.clone()))
    }
}

#[async_trait]
impl TransportClient for JsonRpcTransport {
    async fn attach(&self, server_id: &ServerId, link: WorkerLink) -> TransportResult<()> {
        let connection = match link {
            WorkerLink::Stdio(pipes) => {
                Connection::Stdio(StdioConnection::open(server_id.clone(), pipes))
            }
            WorkerLink::Http { endpoint } => Connection::Http(HttpConnection::new(
                server_id.clone(),
                endpoint,
                self.http.clone(),
            )),
            WorkerLink::Detached => {
                return Err(TransportError::UnsupportedLink {
                    server_id: server_id.clone(),
                    reason: "worker exposes no channel".to_owned(),
                });
            }
        };
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server_id.clone(), Arc::new(connection));
        debug!(server_id = %server_id, "transport attached");
        Ok(())
    }

    async fn handshake(&self, server_id: &ServerId, timeout: Duration) -> TransportResult<()> {
        let connection = self.connection(server_id)?;
        let result = connection
            .request(METHOD_INITIALIZE, Some(initialize_params()), timeout)
            .await?;
        let protocol = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!(server_id = %server_id, protocol, "worker initialised");
        connection.notify(INITIALIZED_NOTIFICATION, timeout).await
    }

    async fn ping(&self, server_id: &ServerId, timeout: Duration) -> TransportResult<()> {
        self.connection(server_id)?
            .request(METHOD_PING, None, timeout)
            .await
            .map(drop)
    }

    async fn send(
        &self,
        server_id: &ServerId,
        envelope: &CallEnvelope,
        timeout: Duration,
    ) -> TransportResult<CallResponse> {
        let result = self
            .connection(server_id)?
            .request(METHOD_TOOLS_CALL, Some(tool_call_params(envelope)), timeout)
            .await?;
        Ok(CallResponse::from_result(result))
    }

    async fn detach(&self, server_id: &ServerId) {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id);
        if removed.is_some() {
            debug!(server_id = %server_id, "transport detached");
        }
    }
}
