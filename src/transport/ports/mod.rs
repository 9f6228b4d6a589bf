//! Port contracts for reaching workers.

mod client;

#[cfg(test)]
pub use client::MockTransportClient;
pub use client::{StdioPipes, TransportClient, WorkerLink};
