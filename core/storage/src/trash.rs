//! Soft delete: moving items to the trash, restoring and expiring them.

use chrono::{DateTime, Utc};
use std::io;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::local::{write_atomic, FileStorage, TRASH_EXTENSION};
use crate::metadata::TrashMetadata;
use silentkey_common::{Result, SecretId, StorageError};

impl FileStorage {
    /// Move an active item to the trash and record when it expires.
    ///
    /// The metadata record is written before the ciphertext is moved, so an
    /// interrupted call can leave a stray `.meta` file but never a trashed
    /// item without an expiry. A stray `.meta` is invisible to listing and
    /// is overwritten the next time the same id is trashed.
    ///
    /// Nothing is written unless the item is active and its trash slot is
    /// free, so an existing trash entry is never touched.
    ///
    /// # Errors
    /// - `StorageError::Delete` with `NotFound` if no active item exists
    /// - `StorageError::Delete` with `AlreadyExists` if the id is already
    ///   in the trash
    /// - `StorageError::Delete` if either step fails; a failed move removes
    ///   the metadata it just wrote
    pub async fn move_to_trash(&self, id: &SecretId) -> Result<TrashMetadata> {
        let _guard = self.io_lock.lock().await;

        info!(id = %id, "Moving item to trash");

        let active = fs::try_exists(self.active_path(id))
            .await
            .map_err(StorageError::Delete)?;
        if !active {
            return Err(StorageError::Delete(io::Error::new(
                io::ErrorKind::NotFound,
                "no active item with this id",
            ))
            .into());
        }

        let occupied = fs::try_exists(self.trash_path(id))
            .await
            .map_err(StorageError::Delete)?;
        if occupied {
            warn!(id = %id, "Trash slot occupied, purge or restore it first");
            return Err(StorageError::Delete(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "an item with this id is already in the trash",
            ))
            .into());
        }

        let metadata = TrashMetadata::new(*id, Utc::now(), self.retention);
        let meta_path = self.trash_meta_path(id);
        let bytes = serde_json::to_vec(&metadata)?;
        write_atomic(&meta_path, &bytes)
            .await
            .map_err(StorageError::Delete)?;

        if let Err(e) = fs::rename(self.active_path(id), self.trash_path(id)).await {
            warn!(id = %id, error = %e, "Move to trash failed");
            let _ = fs::remove_file(&meta_path).await;
            return Err(StorageError::Delete(e).into());
        }

        debug!(id = %id, expires = %metadata.expiration_date, "Item trashed");
        Ok(metadata)
    }

    /// Move a trashed item back into the vault.
    ///
    /// The destination is `target` (defaulting to `id`). If an active item
    /// already occupies it, a fresh id is minted instead. Returns the id the
    /// item now lives under.
    ///
    /// Trash metadata is removed afterwards on a best-effort basis.
    ///
    /// # Errors
    /// - `StorageError::Restore` if the item cannot be moved
    pub async fn restore_from_trash(
        &self,
        id: &SecretId,
        target: Option<SecretId>,
    ) -> Result<SecretId> {
        let _guard = self.io_lock.lock().await;

        info!(id = %id, "Restoring item from trash");

        let mut final_id = target.unwrap_or(*id);
        let occupied = fs::try_exists(self.active_path(&final_id))
            .await
            .map_err(StorageError::Restore)?;
        if occupied {
            final_id = SecretId::new();
            warn!(id = %id, new_id = %final_id, "Id conflict on restore, assigned new id");
        }

        fs::rename(self.trash_path(id), self.active_path(&final_id))
            .await
            .map_err(|e| {
                warn!(id = %id, error = %e, "Restore failed");
                StorageError::Restore(e)
            })?;

        if let Err(e) = fs::remove_file(self.trash_meta_path(id)).await {
            debug!(id = %id, error = %e, "Trash metadata cleanup skipped");
        }

        Ok(final_id)
    }

    /// Irreversibly remove a trashed item.
    ///
    /// # Errors
    /// - `StorageError::Delete` if the ciphertext cannot be removed;
    ///   metadata removal failures are ignored
    pub async fn permanent_delete(&self, id: &SecretId) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        self.permanent_delete_unlocked(id).await
    }

    pub(crate) async fn permanent_delete_unlocked(&self, id: &SecretId) -> Result<()> {
        warn!(id = %id, "Permanently deleting item");

        fs::remove_file(self.trash_path(id))
            .await
            .map_err(StorageError::Delete)?;
        let _ = fs::remove_file(self.trash_meta_path(id)).await;
        Ok(())
    }

    /// Read the ciphertext of a trashed item without moving it.
    ///
    /// # Errors
    /// - `StorageError::Read`, including when no such trash entry exists
    pub async fn load_trashed(&self, id: &SecretId) -> Result<Vec<u8>> {
        let _guard = self.io_lock.lock().await;
        Ok(fs::read(self.trash_path(id))
            .await
            .map_err(StorageError::Read)?)
    }

    /// Metadata recorded for a trashed item, if readable.
    pub async fn trash_metadata(&self, id: &SecretId) -> Option<TrashMetadata> {
        let _guard = self.io_lock.lock().await;
        self.trash_metadata_unlocked(id).await
    }

    pub(crate) async fn trash_metadata_unlocked(&self, id: &SecretId) -> Option<TrashMetadata> {
        let bytes = fs::read(self.trash_meta_path(id)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Every trashed id with its metadata (absent if missing or corrupt).
    pub async fn list_trash(&self) -> Result<Vec<(SecretId, Option<TrashMetadata>)>> {
        let _guard = self.io_lock.lock().await;
        let ids = self
            .list_ids_unlocked(&self.trash_dir, TRASH_EXTENSION)
            .await?;

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let metadata = self.trash_metadata_unlocked(&id).await;
            entries.push((id, metadata));
        }
        Ok(entries)
    }

    /// Permanently delete trashed items whose expiration date has passed.
    ///
    /// Items with missing or unparseable metadata are left alone. Returns
    /// the number of items removed.
    pub async fn clean_expired_trash(&self) -> Result<usize> {
        let _guard = self.io_lock.lock().await;
        self.clean_expired_trash_at(Utc::now()).await
    }

    pub(crate) async fn clean_expired_trash_at(&self, now: DateTime<Utc>) -> Result<usize> {
        info!("Cleaning expired trash");

        let ids = self
            .list_ids_unlocked(&self.trash_dir, TRASH_EXTENSION)
            .await?;
        let mut cleaned = 0;

        for id in ids {
            match self.trash_metadata_unlocked(&id).await {
                Some(metadata) if metadata.is_expired_at(now) => {
                    self.permanent_delete_unlocked(&id).await?;
                    cleaned += 1;
                }
                Some(_) => {}
                None => debug!(id = %id, "No trash metadata, keeping item"),
            }
        }

        info!(count = cleaned, "Expired trash cleaned");
        Ok(cleaned)
    }

    /// Permanently delete everything in the trash. Returns the count.
    pub async fn empty_trash(&self) -> Result<usize> {
        let _guard = self.io_lock.lock().await;

        warn!("Emptying trash");

        let ids = self
            .list_ids_unlocked(&self.trash_dir, TRASH_EXTENSION)
            .await?;
        for id in &ids {
            self.permanent_delete_unlocked(id).await?;
        }

        warn!(count = ids.len(), "Trash emptied");
        Ok(ids.len())
    }

    #[cfg(test)]
    pub(crate) async fn write_trash_metadata(&self, metadata: &TrashMetadata) {
        let bytes = serde_json::to_vec(metadata).unwrap();
        write_atomic(&self.trash_meta_path(&metadata.original_id), &bytes)
            .await
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use silentkey_common::Error;
    use tempfile::TempDir;

    fn storage(temp: &TempDir) -> FileStorage {
        FileStorage::new(temp.path().join("Vault"), temp.path().join("Trash")).unwrap()
    }

    async fn trashed(storage: &FileStorage, data: &[u8]) -> SecretId {
        let id = SecretId::new();
        storage.save(data, &id).await.unwrap();
        storage.move_to_trash(&id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_move_to_trash() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = SecretId::new();
        storage.save(b"secret", &id).await.unwrap();

        let before = Utc::now();
        let metadata = storage.move_to_trash(&id).await.unwrap();

        assert!(!storage.list_all_ids().await.unwrap().contains(&id));
        assert_eq!(storage.list_trash_ids().await.unwrap(), vec![id]);
        assert_eq!(metadata.original_id, id);
        assert!(metadata.deleted_date >= before);
        assert_eq!(
            metadata.expiration_date - metadata.deleted_date,
            Duration::days(30)
        );
        assert_eq!(storage.trash_metadata(&id).await, Some(metadata));
    }

    #[tokio::test]
    async fn test_move_missing_item_fails_without_leftovers() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = SecretId::new();

        let result = storage.move_to_trash(&id).await;
        assert!(matches!(
            result,
            Err(Error::Storage(StorageError::Delete(_)))
        ));
        assert!(storage.trash_metadata(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_trashing_twice_keeps_existing_entry() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = trashed(&storage, b"data").await;
        let before = storage.trash_metadata(&id).await.unwrap();

        match storage.move_to_trash(&id).await {
            Err(Error::Storage(err @ StorageError::Delete(_))) => {
                assert_eq!(err.io_kind(), io::ErrorKind::NotFound)
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert_eq!(storage.trash_metadata(&id).await, Some(before.clone()));
        assert_eq!(storage.load_trashed(&id).await.unwrap(), b"data");

        let later = before.expiration_date + Duration::days(1);
        assert_eq!(storage.clean_expired_trash_at(later).await.unwrap(), 1);
        assert!(storage.list_trash_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trashing_into_occupied_slot_fails() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = trashed(&storage, b"old version").await;
        let before = storage.trash_metadata(&id).await.unwrap();
        storage.save(b"new version", &id).await.unwrap();

        match storage.move_to_trash(&id).await {
            Err(Error::Storage(err @ StorageError::Delete(_))) => {
                assert_eq!(err.io_kind(), io::ErrorKind::AlreadyExists)
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert_eq!(storage.load_trashed(&id).await.unwrap(), b"old version");
        assert_eq!(storage.load(&id).await.unwrap(), b"new version");
        assert_eq!(storage.trash_metadata(&id).await, Some(before));
    }

    #[tokio::test]
    async fn test_load_trashed_missing_is_read_error() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        assert!(matches!(
            storage.load_trashed(&SecretId::new()).await,
            Err(Error::Storage(StorageError::Read(_)))
        ));
    }

    #[tokio::test]
    async fn test_restore_to_free_slot_keeps_id() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = trashed(&storage, b"payload").await;

        let restored = storage.restore_from_trash(&id, None).await.unwrap();

        assert_eq!(restored, id);
        assert_eq!(storage.load(&id).await.unwrap(), b"payload");
        assert!(storage.list_trash_ids().await.unwrap().is_empty());
        assert!(storage.trash_metadata(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_restore_to_occupied_slot_mints_new_id() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = trashed(&storage, b"old").await;
        storage.save(b"new occupant", &id).await.unwrap();

        let restored = storage.restore_from_trash(&id, None).await.unwrap();

        assert_ne!(restored, id);
        assert_eq!(storage.load(&restored).await.unwrap(), b"old");
        assert_eq!(storage.load(&id).await.unwrap(), b"new occupant");
        assert!(storage.list_trash_ids().await.unwrap().is_empty());
        assert!(storage.trash_metadata(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_restore_to_explicit_target() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = trashed(&storage, b"data").await;
        let target = SecretId::new();

        let restored = storage.restore_from_trash(&id, Some(target)).await.unwrap();
        assert_eq!(restored, target);
        assert_eq!(storage.load(&target).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_restore_unknown_id_fails() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let result = storage.restore_from_trash(&SecretId::new(), None).await;
        assert!(matches!(
            result,
            Err(Error::Storage(StorageError::Restore(_)))
        ));
    }

    #[tokio::test]
    async fn test_permanent_delete() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = trashed(&storage, b"data").await;

        storage.permanent_delete(&id).await.unwrap();
        assert!(storage.list_trash_ids().await.unwrap().is_empty());
        assert!(storage.trash_metadata(&id).await.is_none());

        assert!(matches!(
            storage.permanent_delete(&id).await,
            Err(Error::Storage(StorageError::Delete(_)))
        ));
    }

    #[tokio::test]
    async fn test_clean_expired_trash_boundary() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let now = Utc::now();

        let expired = trashed(&storage, b"a").await;
        let fresh = trashed(&storage, b"b").await;
        let at_boundary = trashed(&storage, b"c").await;
        let orphan = trashed(&storage, b"d").await;
        let corrupt = trashed(&storage, b"e").await;

        storage
            .write_trash_metadata(&TrashMetadata {
                original_id: expired,
                deleted_date: now - Duration::days(31),
                expiration_date: now - Duration::days(1),
            })
            .await;
        storage
            .write_trash_metadata(&TrashMetadata {
                original_id: at_boundary,
                deleted_date: now - Duration::days(30),
                expiration_date: now,
            })
            .await;
        std::fs::remove_file(storage.trash_meta_path(&orphan)).unwrap();
        std::fs::write(storage.trash_meta_path(&corrupt), b"not json").unwrap();

        let cleaned = storage.clean_expired_trash_at(now).await.unwrap();

        assert_eq!(cleaned, 1);
        let mut remaining = storage.list_trash_ids().await.unwrap();
        remaining.sort();
        let mut expected = vec![fresh, at_boundary, orphan, corrupt];
        expected.sort();
        assert_eq!(remaining, expected);
    }

    #[tokio::test]
    async fn test_negative_retention_expires_immediately() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp).with_retention(Duration::seconds(-1));
        trashed(&storage, b"a").await;
        trashed(&storage, b"b").await;

        assert_eq!(storage.clean_expired_trash().await.unwrap(), 2);
        assert!(storage.list_trash_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_trash_ignores_expiry() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        trashed(&storage, b"a").await;
        let orphan = trashed(&storage, b"b").await;
        std::fs::remove_file(storage.trash_meta_path(&orphan)).unwrap();

        assert_eq!(storage.empty_trash().await.unwrap(), 2);
        assert!(storage.list_trash_ids().await.unwrap().is_empty());
        assert!(std::fs::read_dir(storage.trash_dir()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_list_trash_reports_metadata() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let with_meta = trashed(&storage, b"a").await;
        let orphan = trashed(&storage, b"b").await;
        std::fs::remove_file(storage.trash_meta_path(&orphan)).unwrap();

        let entries = storage.list_trash().await.unwrap();
        assert_eq!(entries.len(), 2);
        for (id, metadata) in entries {
            if id == with_meta {
                assert!(metadata.is_some());
            } else {
                assert_eq!(id, orphan);
                assert!(metadata.is_none());
            }
        }
    }
}
