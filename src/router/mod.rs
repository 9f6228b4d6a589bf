//! Tool call routing.
//!
//! - Domain: requests, call records and outcomes, parameter validation.
//! - Ports: the append-only call history contract.
//! - Adapters: a bounded in-memory history.
//! - Services: [`services::ToolExecutionRouter`], which validates,
//!   dispatches and records every call.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
