//! Step definitions for process supervisor scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
