//! Synchronisation domain types.

mod client;
mod config;
mod error;
mod render;
mod report;
mod section;

pub use client::{ClientId, ClientKind, ClientProfile, SectionPath};
pub use config::{DEFAULT_BACKUP_SUFFIX, DEFAULT_MAX_RETRIES, SyncConfig};
pub use error::{ParseClientKindError, SyncDomainError};
pub use render::render_entry;
pub use report::{SyncOutcome, SyncSummary};
pub use section::{EmptiedSection, SectionEdit, apply_edit, has_section, parse_document, render_document};
