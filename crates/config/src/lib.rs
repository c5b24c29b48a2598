//! Configuration for the sync layer.
//!
//! Node-specific parameters plus the collaborator bundle a syncer runs with.

mod config;
pub use config::*;
mod parameters;
pub use parameters::*;
