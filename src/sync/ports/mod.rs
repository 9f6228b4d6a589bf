//! Port contracts used by the synchroniser.

mod store;

pub use store::{ConfigStore, ConfigStoreError, ConfigStoreResult};
