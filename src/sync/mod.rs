//! Client configuration synchronisation.
//!
//! - Domain: client profiles, entry rendering, and the section edits that
//!   touch only the server-registration subtree of a client file.
//! - Ports: the [`ports::ConfigStore`] read/replace contract.
//! - Adapters: a capability-scoped filesystem store with staged atomic
//!   replacement, and an in-memory store.
//! - Services: [`services::ClientConfigSynchronizer`].

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
