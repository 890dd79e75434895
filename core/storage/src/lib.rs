//! Encrypted-at-rest file storage for SilentKey.
//!
//! `FileStorage` persists opaque ciphertext blobs keyed by `SecretId` in a
//! vault directory, with a sibling trash directory for soft deletes. It
//! never sees plaintext or keys.
//!
//! # Layout
//! - `<vault>/<id>.vault`: active item
//! - `<vault>/metadata.json`: vault metadata (salt, timestamps, version)
//! - `<trash>/<id>.trash`: trashed item
//! - `<trash>/<id>.meta`: trash bookkeeping (deletion and expiry dates)

pub mod backup;
pub mod local;
pub mod metadata;
pub mod trash;

pub use local::{
    FileStorage, ACTIVE_EXTENSION, DEFAULT_TRASH_RETENTION_DAYS, METADATA_FILENAME,
    TRASH_EXTENSION, TRASH_META_EXTENSION,
};
pub use metadata::{TrashMetadata, VaultBackup, VaultMetadata, METADATA_VERSION};
