//! Serverwave registry - durable index of locally managed game servers.
//!
//! [`ServerRegistry`] owns the list of server records for the lifetime of a
//! process, persists every change through [`SnapshotStore`] (write temp,
//! verify, swap, rotate backups) and rebuilds the list through a
//! [`RecoveryChain`] when the primary snapshot is missing or corrupt.
//! The [`commands`] module is the async surface collaborators call into.

pub mod commands;
pub mod config;
pub mod launch;
pub mod path_guard;
pub mod registry;

pub use config::RegistryConfig;
pub use path_guard::is_contained;
pub use registry::{
    PersistError, RecoveryChain, RegistryError, ServerRecord, ServerRegistry, ServerStatus,
    SnapshotStore,
};
