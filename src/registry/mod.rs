mod error;
mod manager;
pub mod record;
pub mod recovery;
pub mod store;
pub mod validator;

pub use error::{ErrorKind, PersistError, RegistryError};
pub use manager::{DirectoryReclaimer, RemoveDirReclaimer, ServerRegistry};
pub use record::{BackupConfig, Framework, ServerRecord, ServerStatus, TunnelConfig};
pub use recovery::{LoadReport, RecoveryChain, RecoverySource, RecoveryStrategy};
pub use store::SnapshotStore;
