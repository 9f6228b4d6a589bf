//! Line-delimited JSON-RPC over a worker's standard streams.

use crate::registry::domain::ServerId;
use crate::transport::{
    domain::{JsonRpcRequest, JsonRpcResponse, TransportError, TransportResult},
    ports::StdioPipes,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Connection to one worker over its stdin/stdout.
///
/// A background task reads responses and routes them to waiting requests by
/// id. When the worker closes stdout every waiting request fails with
/// [`TransportError::ConnectionClosed`].
pub struct StdioConnection {
    server_id: ServerId,
    writer: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    reader_task: JoinHandle<()>,
}

impl std::fmt::Debug for StdioConnection {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StdioConnection")
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

impl StdioConnection {
    /// Takes ownership of the pipes and starts the response reader.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn open(server_id: ServerId, pipes: StdioPipes) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader_task = tokio::spawn(read_responses(
            server_id.clone(),
            pipes.reader,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));
        Self {
            server_id,
            writer: AsyncMutex::new(pipes.writer),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            reader_task,
        }
    }

    /// Sends a request and waits up to `timeout` for its result.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when no response arrives in time,
    /// [`TransportError::ConnectionClosed`] when the worker hangs up,
    /// [`TransportError::Remote`] for JSON-RPC error replies, and I/O errors
    /// from writing the request.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> TransportResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);
        if self.closed.load(Ordering::SeqCst) {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(TransportError::ConnectionClosed(self.server_id.clone()));
        }

        let outcome = tokio::time::timeout(timeout, async {
            self.write_message(&JsonRpcRequest::new(id, method, params))
                .await?;
            receiver
                .await
                .map_err(|_| TransportError::ConnectionClosed(self.server_id.clone()))
        })
        .await;

        let response = match outcome {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                server_id: self.server_id.clone(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        if response.is_err() {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        }
        into_result(&self.server_id, response?)
    }

    /// Returns whether the worker has closed its output stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends a notification without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from writing the message.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> TransportResult<()> {
        self.write_message(&JsonRpcRequest::notification(method, params))
            .await
    }

    async fn write_message(&self, message: &JsonRpcRequest) -> TransportResult<()> {
        let mut line = serde_json::to_vec(message).map_err(|err| {
            TransportError::MalformedResponse {
                server_id: self.server_id.clone(),
                reason: format!("cannot encode request: {err}"),
            }
        })?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(TransportError::io)?;
        writer.flush().await.map_err(TransportError::io)
    }
}

impl Drop for StdioConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

fn into_result(server_id: &ServerId, response: JsonRpcResponse) -> TransportResult<Value> {
    if let Some(error) = response.error {
        return Err(TransportError::Remote {
            server_id: server_id.clone(),
            code: error.code,
            message: error.message,
        });
    }
    response
        .result
        .ok_or_else(|| TransportError::MalformedResponse {
            server_id: server_id.clone(),
            reason: "response has neither result nor error".to_owned(),
        })
}

async fn read_responses(
    server_id: ServerId,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                    Ok(response) => {
                        let Some(id) = response.id else {
                            debug!(server_id = %server_id, "ignoring worker notification");
                            continue;
                        };
                        let waiter = pending
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&id);
                        match waiter {
                            // A dropped receiver means the caller gave up.
                            Some(sender) => drop(sender.send(response)),
                            None => debug!(server_id = %server_id, id, "late or unknown response"),
                        }
                    }
                    Err(err) => {
                        debug!(server_id = %server_id, error = %err, "non JSON-RPC output line");
                    }
                }
            }
            Ok(None) => {
                debug!(server_id = %server_id, "worker closed stdout");
                break;
            }
            Err(err) => {
                debug!(server_id = %server_id, error = %err, "worker stdout read failed");
                break;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

    fn server_id() -> ServerId {
        ServerId::new("srv-1").expect("valid id")
    }

    /// Returns a connection plus the worker's ends of both pipes.
    fn connect() -> (StdioConnection, DuplexStream, DuplexStream) {
        let (client_writer, worker_stdin) = duplex(4096);
        let (worker_stdout, client_reader) = duplex(4096);
        let connection =
            StdioConnection::open(server_id(), StdioPipes::new(client_writer, client_reader));
        (connection, worker_stdin, worker_stdout)
    }

    /// Answers every request with `reply(request)`.
    fn spawn_worker(
        stdin: DuplexStream,
        mut stdout: DuplexStream,
        reply: impl Fn(&Value) -> Option<Value> + Send + 'static,
    ) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdin).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).expect("request is JSON");
                if let Some(answer) = reply(&request) {
                    let mut encoded = serde_json::to_vec(&answer).expect("encode reply");
                    encoded.push(b'\n');
                    stdout.write_all(&encoded).await.expect("write reply");
                }
            }
        });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn request_receives_matching_result() {
        let (connection, stdin, stdout) = connect();
        spawn_worker(stdin, stdout, |request| {
            Some(json!({"jsonrpc": "2.0", "id": request["id"], "result": {"echo": request["method"]}}))
        });

        let result = connection
            .request("ping", None, Duration::from_secs(2))
            .await
            .expect("request should succeed");
        assert_eq!(result, json!({"echo": "ping"}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_error_is_surfaced() {
        let (connection, stdin, stdout) = connect();
        spawn_worker(stdin, stdout, |request| {
            Some(json!({"jsonrpc": "2.0", "id": request["id"], "error": {"code": -32601, "message": "nope"}}))
        });

        let error = connection
            .request("tools/call", None, Duration::from_secs(2))
            .await
            .expect_err("request should fail");
        assert!(matches!(error, TransportError::Remote { code: -32601, .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn silent_worker_times_out() {
        let (connection, stdin, stdout) = connect();
        spawn_worker(stdin, stdout, |_| None);

        let error = connection
            .request("ping", None, Duration::from_millis(50))
            .await
            .expect_err("request should time out");
        assert!(error.is_timeout());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closed_stdout_fails_waiting_requests() {
        let (connection, stdin, stdout) = connect();
        drop(stdout);
        drop(stdin);

        let error = connection
            .request("ping", None, Duration::from_secs(2))
            .await
            .expect_err("request should fail");
        assert!(matches!(
            error,
            TransportError::ConnectionClosed(_) | TransportError::Io(_)
        ));
    }
}
