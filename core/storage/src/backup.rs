//! Whole-vault snapshots.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::local::{write_atomic, FileStorage, ACTIVE_EXTENSION};
use crate::metadata::VaultBackup;
use silentkey_common::{Result, SecretId, StorageError};

impl FileStorage {
    /// Serialize the vault metadata and every active ciphertext into one blob.
    ///
    /// Items are copied as stored; nothing is decrypted. Trash is excluded.
    ///
    /// # Errors
    /// - `StorageError::Read` if the vault has no metadata or an item cannot
    ///   be read
    pub async fn create_backup(&self) -> Result<Vec<u8>> {
        let _guard = self.io_lock.lock().await;

        let metadata = self.load_metadata_unlocked().await?.ok_or_else(|| {
            StorageError::Read(io::Error::new(
                io::ErrorKind::NotFound,
                "vault metadata not found",
            ))
        })?;

        let ids = self
            .list_ids_unlocked(&self.vault_dir, ACTIVE_EXTENSION)
            .await?;
        let mut items = HashMap::with_capacity(ids.len());
        for id in ids {
            let data = self.load_unlocked(&id).await?;
            items.insert(id.to_string(), data);
        }

        info!(count = items.len(), "Backup created");
        VaultBackup { metadata, items }.to_bytes()
    }

    /// Write metadata and items from a backup blob into the vault.
    ///
    /// Existing items with the same id are overwritten; others are left in
    /// place. Keys that do not parse as ids are skipped. Returns the number
    /// of items written.
    ///
    /// # Errors
    /// - `Error::Serialization` if the blob is not a backup
    /// - `StorageError::Write` if a file cannot be written
    pub async fn restore_backup(&self, bytes: &[u8]) -> Result<usize> {
        let backup = VaultBackup::from_bytes(bytes)?;

        let _guard = self.io_lock.lock().await;

        self.save_metadata_unlocked(&backup.metadata).await?;

        let mut restored = 0;
        for (key, data) in &backup.items {
            let Some(id) = SecretId::parse(key) else {
                warn!(key = %key, "Skipping backup entry with invalid id");
                continue;
            };
            self.save_unlocked(data, &id).await?;
            restored += 1;
        }

        info!(count = restored, "Backup restored");
        Ok(restored)
    }

    /// Atomically write a backup blob to `dest`.
    ///
    /// # Errors
    /// - `StorageError::Write`
    pub async fn write_backup_file(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        write_atomic(dest, bytes)
            .await
            .map_err(StorageError::Write)?;
        info!(path = %dest.display(), "Backup written");
        Ok(())
    }

    /// Read a backup blob from `src`.
    ///
    /// # Errors
    /// - `StorageError::Read`
    pub async fn read_backup_file(&self, src: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(src).await.map_err(StorageError::Read)?)
    }
}
