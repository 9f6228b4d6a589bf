//! Domain model for server definitions and runtime lifecycle.
//!
//! Definitions are immutable once discovered and are replaced wholesale on
//! rediscovery. Runtime records carry the lifecycle state machine and are
//! mutated only through the process supervisor.

mod definition;
mod entry;
mod error;
mod ids;
mod runtime;

pub use definition::{ServerDefinition, ToolSpec, TransportKind};
pub use entry::{RegistryEntry, RegistrySnapshot, StateChange};
pub use error::{ParseServerStateError, ParseTransportKindError, RegistryDomainError};
pub use ids::ServerId;
pub use runtime::{SYNTHETIC_TIMEOUT_EXIT_CODE, ServerRuntime, ServerState};
