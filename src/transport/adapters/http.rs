//! JSON-RPC over HTTP POST.

use crate::registry::domain::ServerId;
use crate::transport::domain::{JsonRpcRequest, JsonRpcResponse, TransportError, TransportResult};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Connection to a worker listening on an HTTP endpoint.
#[derive(Debug)]
pub struct HttpConnection {
    server_id: ServerId,
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpConnection {
    /// Creates a connection sharing the given HTTP client.
    #[must_use]
    pub const fn new(server_id: ServerId, endpoint: String, client: reqwest::Client) -> Self {
        Self {
            server_id,
            endpoint,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts a request and waits up to `timeout` for its result.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when the request exceeds the
    /// bound, [`TransportError::Remote`] for JSON-RPC error replies,
    /// [`TransportError::MalformedResponse`] for undecodable bodies, and
    /// [`TransportError::Http`] for other client failures.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> TransportResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = JsonRpcRequest::new(id, method, params);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| self.map_error(err, timeout))?;

        let decoded: JsonRpcResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                self.timeout_error(timeout)
            } else {
                TransportError::MalformedResponse {
                    server_id: self.server_id.clone(),
                    reason: err.to_string(),
                }
            }
        })?;

        if let Some(error) = decoded.error {
            return Err(TransportError::Remote {
                server_id: self.server_id.clone(),
                code: error.code,
                message: error.message,
            });
        }
        decoded
            .result
            .ok_or_else(|| TransportError::MalformedResponse {
                server_id: self.server_id.clone(),
                reason: "response has neither result nor error".to_owned(),
            })
    }

    /// Posts a notification; the response body is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] when the request fails.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> TransportResult<()> {
        self.client
            .post(&self.endpoint)
            .json(&JsonRpcRequest::notification(method, params))
            .timeout(timeout)
            .send()
            .await
            .map(drop)
            .map_err(|err| self.map_error(err, timeout))
    }

    fn map_error(&self, err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            self.timeout_error(timeout)
        } else {
            TransportError::http(err)
        }
    }

    fn timeout_error(&self, timeout: Duration) -> TransportError {
        TransportError::Timeout {
            server_id: self.server_id.clone(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
