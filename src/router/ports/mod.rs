//! Port contracts used by the router.

mod history;

pub use history::{CallHistory, CallHistoryError, CallHistoryResult};
