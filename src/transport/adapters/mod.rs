//! Transport adapter implementations.

mod http;
mod jsonrpc;
mod memory;
mod stdio;

pub use http::HttpConnection;
pub use jsonrpc::JsonRpcTransport;
pub use memory::InMemoryTransport;
pub use stdio::StdioConnection;
