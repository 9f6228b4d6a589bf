//! Switchyard: a control plane for tool-serving worker processes.
//!
//! The crate discovers worker servers, supervises their OS processes, routes
//! validated tool calls to running workers, and keeps IDE client
//! configuration files in step with the set of registered servers.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure types and invariants with no infrastructure dependencies
//! - **Ports**: Async trait seams for processes, transports and files
//! - **Adapters**: OS, network, filesystem and in-memory implementations
//! - **Services**: Orchestration over a shared [`registry::services::ServerRegistry`]
//!
//! # Modules
//!
//! - [`registry`]: Server definitions, lifecycle state machine and discovery
//! - [`transport`]: JSON-RPC framing over stdio and HTTP
//! - [`supervisor`]: Process start, stop, liveness and restart policy
//! - [`router`]: Parameter validation, dispatch and call history
//! - [`sync`]: Crash-safe client configuration rewriting
//! - [`control_plane`]: Structured results over all operation groups
//! - [`config`]: TOML configuration loading

pub mod config;
pub mod control_plane;
pub mod error;
pub mod registry;
pub mod router;
pub mod supervisor;
pub mod sync;
pub mod transport;
