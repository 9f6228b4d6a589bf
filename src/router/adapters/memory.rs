//! Bounded in-memory call history.

use crate::router::{
    domain::{DEFAULT_HISTORY_CAPACITY, ToolCallRecord},
    ports::{CallHistory, CallHistoryResult},
};
use crate::transport::domain::CallId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

/// Call history that keeps the most recent records in memory.
///
/// When full, appending evicts the oldest record.
#[derive(Debug, Clone)]
pub struct InMemoryCallHistory {
    records: Arc<RwLock<VecDeque<ToolCallRecord>>>,
    capacity: usize,
}

impl InMemoryCallHistory {
    /// Creates a history retaining at most `capacity` records.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let bounded = capacity.max(1);
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(bounded.min(64)))),
            capacity: bounded,
        }
    }

    /// Returns the retention bound.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether no record is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCallHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

#[async_trait]
impl CallHistory for InMemoryCallHistory {
    async fn append(&self, record: ToolCallRecord) -> CallHistoryResult<()> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> CallHistoryResult<Vec<ToolCallRecord>> {
        let records = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let skip = records.len().saturating_sub(limit);
        Ok(records.iter().skip(skip).cloned().collect())
    }

    async fn find(&self, call_id: CallId) -> CallHistoryResult<Option<ToolCallRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|record| record.call_id() == call_id)
            .cloned())
    }
}
