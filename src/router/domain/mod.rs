//! Routing domain types.

mod config;
mod outcome;
mod record;
mod validation;

pub use config::{DEFAULT_CALL_TIMEOUT, DEFAULT_HISTORY_CAPACITY, RouterConfig};
pub use outcome::{CallOutcome, ParseCallOutcomeError};
pub use record::{PendingCall, ToolCallRecord, ToolCallRequest, ToolCallResult};
pub use validation::{FieldViolation, validate_parameters};
