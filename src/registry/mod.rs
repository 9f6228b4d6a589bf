//! Server registry for the control plane.
//!
//! The registry is the single source of truth mapping a server identifier to
//! its discovered definition and its runtime lifecycle record. The module
//! follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The shared in-memory registry in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
