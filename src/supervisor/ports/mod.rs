//! Port contracts for OS process control.

mod host;

pub use host::{SpawnedWorker, WorkerExit, WorkerHost, WorkerHostError, WorkerHostResult};
