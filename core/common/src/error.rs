//! Common error types for SilentKey.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for SilentKey operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation that needs the master key was called while locked.
    #[error("Vault is locked")]
    VaultLocked,

    /// Vault metadata or a record is missing.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Empty or otherwise unusable password at derivation time.
    #[error("Invalid password")]
    InvalidPassword,

    /// The key derivation function failed internally.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Sealing plaintext failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Authentication tag mismatch (wrong key or corrupted data) or a
    /// decrypted payload that does not match the expected schema.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// A record failed its own validation rules.
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    /// A record decoded fine but belongs to another record type.
    #[error("Wrong secret kind: expected {expected}, found {found}")]
    WrongSecretKind { expected: String, found: String },

    /// Filesystem persistence failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Serialization or deserialization of metadata, backups or config failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task could not complete.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Filesystem failures, each wrapping the underlying I/O cause.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    Write(#[source] io::Error),

    #[error("Read failed: {0}")]
    Read(#[source] io::Error),

    #[error("Delete failed: {0}")]
    Delete(#[source] io::Error),

    #[error("Restore failed: {0}")]
    Restore(#[source] io::Error),

    #[error("List failed: {0}")]
    List(#[source] io::Error),

    #[error("Could not create directory {}: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// The wrapped I/O error kind, if any.
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::Write(e)
            | Self::Read(e)
            | Self::Delete(e)
            | Self::Restore(e)
            | Self::List(e) => e.kind(),
            Self::DirectoryCreation { source, .. } => source.kind(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_keeps_io_kind() {
        let err = StorageError::Read(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.io_kind(), io::ErrorKind::NotFound);

        let wrapped: Error = err.into();
        assert!(matches!(wrapped, Error::Storage(StorageError::Read(_))));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(Error::VaultLocked.to_string(), "Vault is locked");
        let err = Error::WrongSecretKind {
            expected: "item".to_string(),
            found: "ssh_key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Wrong secret kind: expected item, found ssh_key"
        );
    }
}
