// Error types for the server registry

use serde::ser::SerializeStruct;
use serde::Serialize;
use thiserror::Error;

/// Failures of a single `persist` call.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),

    #[error("Snapshot write could not be verified: {0}")]
    WriteVerification(String),

    #[error("Could not replace the server list on disk: {0}")]
    AtomicSwapFailed(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid server record: {0}")]
    Validation(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Server not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    ValidationError,
    AccessDenied,
    NotFound,
    SerializationError,
    WriteVerificationError,
    AtomicSwapFailed,
    Io,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Validation(_) => ErrorKind::ValidationError,
            RegistryError::AccessDenied(_) => ErrorKind::AccessDenied,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::Persist(PersistError::Serialization(_)) => ErrorKind::SerializationError,
            RegistryError::Persist(PersistError::WriteVerification(_)) => {
                ErrorKind::WriteVerificationError
            }
            RegistryError::Persist(PersistError::AtomicSwapFailed(_)) => ErrorKind::AtomicSwapFailed,
            RegistryError::Io(_) => ErrorKind::Io,
        }
    }

    /// Only a failed swap means a requested change was not durably saved.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, RegistryError::Persist(PersistError::AtomicSwapFailed(_)))
    }
}

// Rendered as `{ kind, message }` for the UI shell
impl Serialize for RegistryError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RegistryError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
