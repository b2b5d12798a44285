//! Registry error types

use hookrelay_store::StoreError;
use thiserror::Error;

/// Broad failure classes, used to pick HTTP statuses and log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client or hook absent
    NotFound,
    /// Name or identifier collision
    AlreadyExists,
    /// Illegal caller input
    InvalidInput,
    /// Secret or uuid generation failed
    CredentialFailure,
    /// Relay transport failed
    TransportFailure,
    /// Persistence read, write or decode failed
    StorageFailure,
}

/// Errors returned by registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("A client with the name '{0}' already exists")]
    ClientExists(String),

    #[error("A client with the name '{0}' does not exist")]
    ClientNotExists(String),

    #[error("Hook with identifier '{0}' already exists")]
    HookExists(String),

    #[error("Hook '{0}' not found")]
    HookNotExists(String),

    #[error("Client name '{name}' is invalid: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Secret only has {got} bytes instead of {want}")]
    SecretTooShort { got: usize, want: usize },

    #[error("Could not generate client secret: {0}")]
    SecretGenerationFailed(String),

    #[error("Could not generate UUID: {0}")]
    CreatingUuidFailed(String),

    #[error("Relay failed: {0}")]
    Relay(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Stored value for '{key}' could not be decoded: {reason}")]
    Decode { key: String, reason: String },
}

impl RegistryError {
    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::ClientNotExists(_) | RegistryError::HookNotExists(_) => {
                ErrorKind::NotFound
            }
            RegistryError::ClientExists(_) | RegistryError::HookExists(_) => {
                ErrorKind::AlreadyExists
            }
            RegistryError::InvalidName { .. } => ErrorKind::InvalidInput,
            RegistryError::SecretTooShort { .. }
            | RegistryError::SecretGenerationFailed(_)
            | RegistryError::CreatingUuidFailed(_) => ErrorKind::CredentialFailure,
            RegistryError::Relay(_) => ErrorKind::TransportFailure,
            RegistryError::Storage(_) | RegistryError::Decode { .. } => ErrorKind::StorageFailure,
        }
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            RegistryError::ClientNotExists("a".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            RegistryError::HookExists("orders".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            RegistryError::InvalidName {
                name: "a.b".into(),
                reason: "contains '.'"
            }
            .kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            RegistryError::SecretTooShort { got: 3, want: 32 }.kind(),
            ErrorKind::CredentialFailure
        );
        assert_eq!(
            RegistryError::Decode {
                key: "a.CreatedAt".into(),
                reason: "bad".into()
            }
            .kind(),
            ErrorKind::StorageFailure
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            RegistryError::ClientExists("acme".into()).to_string(),
            "A client with the name 'acme' already exists"
        );
        assert_eq!(
            RegistryError::SecretTooShort { got: 3, want: 32 }.to_string(),
            "Secret only has 3 bytes instead of 32"
        );
    }
}
