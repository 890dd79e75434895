//! Persisted metadata records and the backup snapshot format.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use silentkey_common::encoding::base64_map;
use silentkey_common::{Result, SecretId};
use silentkey_crypto::Salt;

/// Metadata format version written by this build.
pub const METADATA_VERSION: &str = "1.0";

/// Vault-wide metadata, one per vault.
///
/// The salt is fixed for the lifetime of the vault; `last_modified` moves
/// forward on every item update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMetadata {
    pub salt: Salt,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub version: String,
}

impl VaultMetadata {
    /// Fresh metadata for a newly set up vault.
    pub fn new(salt: Salt) -> Self {
        let now = Utc::now();
        Self {
            salt,
            created_at: now,
            last_modified: now,
            version: METADATA_VERSION.to_string(),
        }
    }

    /// Record a mutation.
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }
}

/// Bookkeeping for one trashed item, stored next to its ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashMetadata {
    pub original_id: SecretId,
    pub deleted_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

impl TrashMetadata {
    /// The expiration date saturates at the latest representable instant
    /// rather than overflowing.
    pub fn new(original_id: SecretId, deleted_date: DateTime<Utc>, retention: Duration) -> Self {
        Self {
            original_id,
            deleted_date,
            expiration_date: deleted_date
                .checked_add_signed(retention)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Strictly past its expiration date at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date < now
    }
}

/// Snapshot of the active vault: metadata plus every ciphertext keyed by
/// the id's string form. Trash is not included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultBackup {
    pub metadata: VaultMetadata,
    #[serde(with = "base64_map")]
    pub items: HashMap<String, Vec<u8>>,
}

impl VaultBackup {
    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
