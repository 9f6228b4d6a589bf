//! Append-only store of tool call records.

use crate::router::domain::ToolCallRecord;
use crate::transport::domain::CallId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for call history operations.
pub type CallHistoryResult<T> = Result<T, CallHistoryError>;

/// Append-only log of completed calls.
///
/// Records are never modified once appended. Reads return copies.
#[async_trait]
pub trait CallHistory: Send + Sync {
    /// Appends a record.
    async fn append(&self, record: ToolCallRecord) -> CallHistoryResult<()>;

    /// Returns up to `limit` records, newest last.
    async fn recent(&self, limit: usize) -> CallHistoryResult<Vec<ToolCallRecord>>;

    /// Finds a record by call identifier.
    async fn find(&self, call_id: CallId) -> CallHistoryResult<Option<ToolCallRecord>>;
}

/// Errors returned by call history adapters.
#[derive(Debug, Clone, Error)]
pub enum CallHistoryError {
    /// Storage failure.
    #[error("call history storage error: {0}")]
    Storage(Arc<dyn std::error::Error + Send + Sync>),
}

impl CallHistoryError {
    /// Wraps a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Arc::new(err))
    }
}
