//! Supervisor configuration and observation types.

mod config;
mod liveness;

pub use config::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LOCK_TIMEOUT, DEFAULT_START_TIMEOUT, DEFAULT_STOP_GRACE,
    RestartPolicy, SupervisorConfig,
};
pub use liveness::LivenessOutcome;
