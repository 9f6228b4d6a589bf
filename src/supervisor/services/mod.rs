//! Supervisor services.

mod supervisor;

pub use supervisor::{ProcessSupervisor, SupervisorError, SupervisorResult};
