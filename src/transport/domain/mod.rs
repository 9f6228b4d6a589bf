//! Transport domain types.

mod envelope;
mod error;
mod jsonrpc;

pub use envelope::{CallEnvelope, CallId, CallResponse};
pub use error::{TransportError, TransportResult};
pub use jsonrpc::{
    INITIALIZED_NOTIFICATION, JsonRpcError, JsonRpcRequest, JsonRpcResponse, METHOD_INITIALIZE,
    METHOD_PING, METHOD_TOOLS_CALL, PROTOCOL_VERSION, initialize_params, tool_call_params,
};
