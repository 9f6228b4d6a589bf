//! Transport layer reaching worker processes.
//!
//! Framing and timeouts only; no business logic lives here.
//!
//! - Domain: call envelopes, responses, JSON-RPC 2.0 messages, errors.
//! - Ports: the [`ports::TransportClient`] contract and worker links.
//! - Adapters: stdio and HTTP JSON-RPC connections plus a scripted
//!   in-memory transport.

pub mod adapters;
pub mod domain;
pub mod ports;
