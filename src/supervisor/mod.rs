//! Process supervision for worker servers.
//!
//! - Domain: restart policy, timing bounds and liveness outcomes.
//! - Ports: the [`ports::WorkerHost`] contract for OS process control.
//! - Adapters: a tokio process host and an in-memory host.
//! - Services: [`services::ProcessSupervisor`], the only writer of runtime
//!   records in the registry.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
