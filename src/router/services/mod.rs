//! Router services.

mod router;

pub use router::{RouterError, RouterResult, ToolExecutionRouter};
