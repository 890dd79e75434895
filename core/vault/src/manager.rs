//! Vault state machine.
//!
//! `VaultManager` owns the unlock state and the in-memory master key and
//! composes [`EncryptionManager`] with [`FileStorage`]. It performs no
//! cryptography or filesystem I/O of its own.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::VaultSettings;
use crate::secret::{EnvelopeRef, RawEnvelope, SecretRecord};
use silentkey_common::{Error, Result, SecretId};
use silentkey_crypto::{EncryptedContainer, EncryptionManager, MasterKey, Salt};
use silentkey_storage::{FileStorage, TrashMetadata, VaultBackup, VaultMetadata};

/// Lock state. The key is zeroized when the state is replaced or dropped.
enum VaultState {
    Locked,
    Unlocked(MasterKey),
}

impl VaultState {
    fn key(&self) -> Result<&MasterKey> {
        match self {
            VaultState::Unlocked(key) => Ok(key),
            VaultState::Locked => Err(Error::VaultLocked),
        }
    }
}

/// Why a stored item was left out of a typed listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The item decrypted fine but holds another record type.
    OtherKind(String),
    /// The item could not be read, opened or decoded.
    Undecodable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: SecretId,
    pub reason: SkipReason,
}

/// Result of a typed listing: decoded records plus everything skipped.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub skipped: Vec<SkippedRecord>,
}

/// Password-protected secret vault.
///
/// Every operation holds the state lock for its whole duration, so calls on
/// one manager never interleave.
pub struct VaultManager {
    crypto: EncryptionManager,
    storage: Arc<FileStorage>,
    state: Mutex<VaultState>,
}

impl VaultManager {
    /// Create a locked manager over the given collaborators.
    pub fn new(crypto: EncryptionManager, storage: Arc<FileStorage>) -> Self {
        Self {
            crypto,
            storage,
            state: Mutex::new(VaultState::Locked),
        }
    }

    /// Build storage and crypto from settings.
    ///
    /// # Errors
    /// - `StorageError::DirectoryCreation` if the vault layout cannot be created
    pub fn from_settings(settings: &VaultSettings) -> Result<Self> {
        let storage = settings.build_storage()?;
        Ok(Self::new(
            EncryptionManager::new(settings.kdf.clone()),
            Arc::new(storage),
        ))
    }

    pub fn storage(&self) -> &Arc<FileStorage> {
        &self.storage
    }

    /// Run the KDF on the blocking pool.
    async fn derive(&self, password: &[u8], salt: Salt) -> Result<MasterKey> {
        let crypto = self.crypto.clone();
        let password = Zeroizing::new(password.to_vec());
        tokio::task::spawn_blocking(move || crypto.derive_key(&password, &salt))
            .await
            .map_err(|e| Error::Internal(format!("key derivation task failed: {}", e)))?
    }

    fn seal<T: SecretRecord>(&self, record: &T, key: &MasterKey) -> Result<Vec<u8>> {
        self.crypto.encrypt(
            &EnvelopeRef {
                kind: T::KIND,
                record,
            },
            key,
        )
    }

    fn open<T: SecretRecord>(&self, data: &[u8], key: &MasterKey) -> Result<T> {
        self.crypto
            .decrypt::<RawEnvelope>(data, key)?
            .into_record()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Initialise a vault with a new master password and unlock it.
    ///
    /// # Postconditions
    /// - Fresh metadata with a new salt is persisted, replacing any existing
    ///   metadata
    /// - The vault is unlocked
    ///
    /// # Errors
    /// - `Error::InvalidPassword` if the password is empty; nothing is
    ///   written in that case
    pub async fn setup(&self, password: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;

        info!("Setting up vault");

        let salt = Salt::generate();
        let key = self.derive(password, salt.clone()).await?;
        self.storage.save_metadata(&VaultMetadata::new(salt)).await?;

        *state = VaultState::Unlocked(key);
        info!("Vault initialised and unlocked");
        Ok(())
    }

    /// Unlock with the master password.
    ///
    /// The password is not verified here: a wrong password yields a key that
    /// fails on the first read.
    ///
    /// # Errors
    /// - `Error::ItemNotFound` if the vault was never set up
    /// - `Error::InvalidPassword` if the password is empty
    pub async fn unlock(&self, password: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;

        info!("Unlocking vault");

        let metadata = self.storage.load_metadata().await?.ok_or_else(|| {
            warn!("Vault metadata missing, vault must be set up first");
            Error::ItemNotFound("vault metadata".to_string())
        })?;

        let key = self.derive(password, metadata.salt).await?;
        *state = VaultState::Unlocked(key);

        info!("Vault unlocked");
        Ok(())
    }

    /// Drop the master key. Idempotent.
    pub async fn lock(&self) {
        let mut state = self.state.lock().await;
        *state = VaultState::Locked;
        info!("Vault locked");
    }

    pub async fn is_unlocked(&self) -> bool {
        matches!(*self.state.lock().await, VaultState::Unlocked(_))
    }

    /// Whether vault metadata exists.
    pub async fn is_initialized(&self) -> Result<bool> {
        Ok(self.storage.load_metadata().await?.is_some())
    }

    /// Current vault metadata, if set up.
    pub async fn metadata(&self) -> Result<Option<VaultMetadata>> {
        self.storage.load_metadata().await
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Validate, encrypt and persist a new record.
    ///
    /// # Errors
    /// - `Error::VaultLocked`
    /// - `Error::InvalidSecret` if the record fails validation
    pub async fn create<T: SecretRecord>(&self, item: T) -> Result<T> {
        let state = self.state.lock().await;
        let key = state.key()?;

        item.validate()?;
        let data = self.seal(&item, key)?;
        self.storage.save(&data, &item.id()).await?;

        info!(id = %item.id(), kind = T::KIND, "Item created");
        Ok(item)
    }

    /// Load and decrypt a record.
    ///
    /// # Errors
    /// - `Error::VaultLocked`
    /// - `StorageError::Read` if no such item exists
    /// - `Error::Decryption` on a wrong key, corruption or schema mismatch
    /// - `Error::WrongSecretKind` if the item holds another record type
    pub async fn read<T: SecretRecord>(&self, id: &SecretId) -> Result<T> {
        let state = self.state.lock().await;
        let key = state.key()?;

        let data = self.storage.load(id).await?;
        let item = self.open(&data, key)?;
        debug!(id = %id, "Item read");
        Ok(item)
    }

    /// Stamp, re-encrypt and persist a record, then refresh the vault's
    /// last-modified time.
    pub async fn update<T: SecretRecord>(&self, mut item: T) -> Result<T> {
        let state = self.state.lock().await;
        let key = state.key()?;

        item.validate()?;
        item.set_modified_at(Utc::now());
        let data = self.seal(&item, key)?;
        self.storage.save(&data, &item.id()).await?;

        if let Some(mut metadata) = self.storage.load_metadata().await? {
            metadata.touch();
            self.storage.save_metadata(&metadata).await?;
        }

        info!(id = %item.id(), "Item updated");
        Ok(item)
    }

    /// Soft delete: move the item to the trash.
    pub async fn delete(&self, id: &SecretId) -> Result<TrashMetadata> {
        let state = self.state.lock().await;
        state.key()?;

        let metadata = self.storage.move_to_trash(id).await?;
        info!(id = %id, "Item deleted");
        Ok(metadata)
    }

    /// Every record of type `T`. Items that cannot be decoded as `T` are
    /// skipped and logged.
    pub async fn list<T: SecretRecord>(&self) -> Result<Vec<T>> {
        Ok(self.list_detailed().await?.items)
    }

    /// Every record of type `T`, plus the ids skipped and why.
    ///
    /// Order is unspecified.
    pub async fn list_detailed<T: SecretRecord>(&self) -> Result<Listing<T>> {
        let state = self.state.lock().await;
        let key = state.key()?;

        let ids = self.storage.list_all_ids().await?;
        let mut items = Vec::with_capacity(ids.len());
        let mut skipped = Vec::new();

        for id in ids {
            let decoded = match self.storage.load(&id).await {
                Ok(data) => self.open::<T>(&data, key),
                Err(e) => Err(e),
            };
            match decoded {
                Ok(item) => items.push(item),
                Err(Error::WrongSecretKind { found, .. }) => {
                    debug!(id = %id, kind = %found, "Skipping item of another kind");
                    skipped.push(SkippedRecord {
                        id,
                        reason: SkipReason::OtherKind(found),
                    });
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping undecodable item");
                    skipped.push(SkippedRecord {
                        id,
                        reason: SkipReason::Undecodable(e.to_string()),
                    });
                }
            }
        }

        debug!(count = items.len(), skipped = skipped.len(), "Listed items");
        Ok(Listing { items, skipped })
    }

    /// Records of type `T` whose searchable text contains `query`, ignoring
    /// case. An empty query matches everything.
    pub async fn search<T: SecretRecord>(&self, query: &str) -> Result<Vec<T>> {
        let needle = query.to_lowercase();
        let items = self.list::<T>().await?;
        Ok(items
            .into_iter()
            .filter(|item| item.searchable_text().to_lowercase().contains(&needle))
            .collect())
    }

    // ------------------------------------------------------------------
    // Trash
    // ------------------------------------------------------------------

    /// Trashed ids with their metadata.
    pub async fn list_trash(&self) -> Result<Vec<(SecretId, Option<TrashMetadata>)>> {
        let state = self.state.lock().await;
        state.key()?;
        self.storage.list_trash().await
    }

    /// Restore a trashed item. Returns the id it now lives under.
    ///
    /// When the original slot is occupied the item gets a fresh id, and the
    /// id embedded in the record is rewritten to match.
    ///
    /// # Errors
    /// - `Error::Decryption` if the trashed record cannot be opened with the
    ///   current key; the item stays in the trash
    /// - `StorageError::Read` / `StorageError::Restore` on I/O failure
    pub async fn restore_from_trash(&self, id: &SecretId) -> Result<SecretId> {
        let state = self.state.lock().await;
        let key = state.key()?;

        let data = self.storage.load_trashed(id).await?;
        let mut envelope: RawEnvelope = self.crypto.decrypt(&data, key)?;

        let restored = self.storage.restore_from_trash(id, None).await?;
        if restored != *id {
            let rewritten = envelope
                .set_id(restored)
                .and_then(|()| self.crypto.encrypt(&envelope, key));
            let saved = match rewritten {
                Ok(data) => self.storage.save(&data, &restored).await,
                Err(e) => Err(e),
            };
            if let Err(e) = saved {
                warn!(id = %id, new_id = %restored, error = %e, "Restored item keeps its old embedded id");
                return Err(e);
            }
            info!(id = %id, new_id = %restored, "Restored item under a new id");
        } else {
            info!(id = %id, "Item restored");
        }
        Ok(restored)
    }

    /// Irreversibly delete one trashed item.
    pub async fn purge(&self, id: &SecretId) -> Result<()> {
        let state = self.state.lock().await;
        state.key()?;
        self.storage.permanent_delete(id).await
    }

    /// Irreversibly delete everything in the trash.
    pub async fn empty_trash(&self) -> Result<usize> {
        let state = self.state.lock().await;
        state.key()?;
        self.storage.empty_trash().await
    }

    /// Irreversibly delete trashed items past their expiration date.
    pub async fn clean_expired_trash(&self) -> Result<usize> {
        let state = self.state.lock().await;
        state.key()?;
        self.storage.clean_expired_trash().await
    }

    // ------------------------------------------------------------------
    // Backup, export and import
    // ------------------------------------------------------------------

    /// Write a backup of the active vault to `destination`.
    pub async fn create_backup(&self, destination: &Path) -> Result<()> {
        let state = self.state.lock().await;
        state.key()?;

        info!(path = %destination.display(), "Creating backup");
        let bytes = self.storage.create_backup().await?;
        self.storage.write_backup_file(destination, &bytes).await
    }

    /// Replace vault metadata and items with those from a backup file.
    ///
    /// A key is derived from the backup's salt to reject empty passwords and
    /// then discarded; the password is not otherwise checked. The vault is
    /// left locked since the restored salt may differ from the current one.
    /// Returns the number of items restored.
    pub async fn restore_backup(&self, source: &Path, password: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().await;

        info!(path = %source.display(), "Restoring backup");

        let bytes = self.storage.read_backup_file(source).await?;
        let backup = VaultBackup::from_bytes(&bytes)?;
        drop(self.derive(password, backup.metadata.salt).await?);

        let count = self.storage.restore_backup(&bytes).await?;
        *state = VaultState::Locked;

        info!(count, "Backup restored");
        Ok(count)
    }

    /// Seal every record of type `T` into a container protected by
    /// `password` alone. Undecodable items are skipped.
    pub async fn export_items<T: SecretRecord>(&self, password: &[u8]) -> Result<EncryptedContainer> {
        let items = self.list::<T>().await?;

        let plaintext = Zeroizing::new(serde_json::to_vec(&items)?);
        let crypto = self.crypto.clone();
        let password = Zeroizing::new(password.to_vec());
        let container = tokio::task::spawn_blocking(move || {
            crypto.encrypt_with_new_salt(&plaintext, &password)
        })
        .await
        .map_err(|e| Error::Internal(format!("export task failed: {}", e)))??;

        info!(count = items.len(), kind = T::KIND, "Items exported");
        Ok(container)
    }

    /// Decrypt a container and store every record in it under its own id,
    /// overwriting existing items. Returns the number imported.
    ///
    /// # Errors
    /// - `Error::Decryption` if the password is wrong or the container does
    ///   not hold records of type `T`
    pub async fn import_items<T: SecretRecord>(
        &self,
        container: &EncryptedContainer,
        password: &[u8],
    ) -> Result<usize> {
        let state = self.state.lock().await;
        let key = state.key()?;

        let crypto = self.crypto.clone();
        let owned = container.clone();
        let password = Zeroizing::new(password.to_vec());
        let plaintext = tokio::task::spawn_blocking(move || {
            crypto.decrypt_container(&owned, &password)
        })
        .await
        .map_err(|e| Error::Internal(format!("import task failed: {}", e)))??;

        let items: Vec<T> = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::Decryption(format!("unexpected payload: {}", e)))?;

        for item in &items {
            item.validate()?;
            let data = self.seal(item, key)?;
            self.storage.save(&data, &item.id()).await?;
        }

        info!(count = items.len(), kind = T::KIND, "Items imported");
        Ok(items.len())
    }
}
