//! Local filesystem storage for encrypted secrets.

use chrono::Duration;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::metadata::VaultMetadata;
use silentkey_common::{Error, Result, SecretId, StorageError};

/// Extension of active ciphertext files.
pub const ACTIVE_EXTENSION: &str = "vault";

/// Extension of trashed ciphertext files.
pub const TRASH_EXTENSION: &str = "trash";

/// Extension of trash metadata files.
pub const TRASH_META_EXTENSION: &str = "meta";

/// Vault metadata file name inside the vault directory.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Default time a trashed item survives before `clean_expired_trash` removes it.
pub const DEFAULT_TRASH_RETENTION_DAYS: i64 = 30;

/// Ciphertext persistence with soft-delete semantics.
///
/// Owns two directories: the active vault and the trash. Every public
/// operation takes `io_lock` for its whole duration, so operations are
/// totally ordered and never interleave on disk. Internal helpers with an
/// `_unlocked` suffix assume the caller already holds the lock.
pub struct FileStorage {
    pub(crate) vault_dir: PathBuf,
    pub(crate) trash_dir: PathBuf,
    pub(crate) retention: Duration,
    pub(crate) io_lock: Mutex<()>,
}

impl FileStorage {
    /// Create storage rooted at the two given directories.
    ///
    /// # Postconditions
    /// - Both directories exist
    ///
    /// # Errors
    /// - `StorageError::DirectoryCreation` if either directory cannot be created
    pub fn new(vault_dir: impl AsRef<Path>, trash_dir: impl AsRef<Path>) -> Result<Self> {
        let vault_dir = vault_dir.as_ref().to_path_buf();
        let trash_dir = trash_dir.as_ref().to_path_buf();

        // Sync on purpose: constructors are not async
        for dir in [&vault_dir, &trash_dir] {
            std::fs::create_dir_all(dir).map_err(|source| StorageError::DirectoryCreation {
                path: dir.clone(),
                source,
            })?;
        }

        info!(vault = %vault_dir.display(), trash = %trash_dir.display(), "File storage ready");

        Ok(Self {
            vault_dir,
            trash_dir,
            retention: Duration::days(DEFAULT_TRASH_RETENTION_DAYS),
            io_lock: Mutex::new(()),
        })
    }

    /// Override how long trashed items are kept.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    pub fn trash_dir(&self) -> &Path {
        &self.trash_dir
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub(crate) fn active_path(&self, id: &SecretId) -> PathBuf {
        self.vault_dir.join(format!("{}.{}", id, ACTIVE_EXTENSION))
    }

    pub(crate) fn trash_path(&self, id: &SecretId) -> PathBuf {
        self.trash_dir.join(format!("{}.{}", id, TRASH_EXTENSION))
    }

    pub(crate) fn trash_meta_path(&self, id: &SecretId) -> PathBuf {
        self.trash_dir.join(format!("{}.{}", id, TRASH_META_EXTENSION))
    }

    fn metadata_path(&self) -> PathBuf {
        self.vault_dir.join(METADATA_FILENAME)
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Persist ciphertext for `id`, replacing any previous version atomically.
    ///
    /// # Errors
    /// - `StorageError::Write`
    pub async fn save(&self, data: &[u8], id: &SecretId) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        self.save_unlocked(data, id).await
    }

    pub(crate) async fn save_unlocked(&self, data: &[u8], id: &SecretId) -> Result<()> {
        debug!(id = %id, size = data.len(), "Saving item");

        write_atomic(&self.active_path(id), data).await.map_err(|e| {
            error!(id = %id, error = %e, "Save failed");
            StorageError::Write(e)
        })?;
        Ok(())
    }

    /// Read the ciphertext stored for `id`.
    ///
    /// # Errors
    /// - `StorageError::Read`, including when no such item exists
    pub async fn load(&self, id: &SecretId) -> Result<Vec<u8>> {
        let _guard = self.io_lock.lock().await;
        self.load_unlocked(id).await
    }

    pub(crate) async fn load_unlocked(&self, id: &SecretId) -> Result<Vec<u8>> {
        debug!(id = %id, "Loading item");

        fs::read(self.active_path(id)).await.map_err(|e| {
            debug!(id = %id, error = %e, "Load failed");
            StorageError::Read(e).into()
        })
    }

    /// Whether an active item exists for `id`.
    pub async fn contains(&self, id: &SecretId) -> Result<bool> {
        let _guard = self.io_lock.lock().await;
        Ok(fs::try_exists(self.active_path(id))
            .await
            .map_err(StorageError::Read)?)
    }

    /// Ids of every active item. Unordered.
    pub async fn list_all_ids(&self) -> Result<Vec<SecretId>> {
        let _guard = self.io_lock.lock().await;
        self.list_ids_unlocked(&self.vault_dir, ACTIVE_EXTENSION).await
    }

    /// Ids of every trashed item. Unordered.
    pub async fn list_trash_ids(&self) -> Result<Vec<SecretId>> {
        let _guard = self.io_lock.lock().await;
        self.list_ids_unlocked(&self.trash_dir, TRASH_EXTENSION).await
    }

    /// Enumerate `dir`, keep files with `extension` whose stem is an id in
    /// canonical form. Anything else, including other spellings of a valid
    /// UUID, is skipped silently.
    pub(crate) async fn list_ids_unlocked(
        &self,
        dir: &Path,
        extension: &str,
    ) -> Result<Vec<SecretId>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(dir).await.map_err(StorageError::List)?;

        while let Some(entry) = entries.next_entry().await.map_err(StorageError::List)? {
            let path = entry.path();
            if path.extension() != Some(OsStr::new(extension)) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(SecretId::parse_canonical)
            {
                ids.push(id);
            }
        }

        debug!(dir = %dir.display(), count = ids.len(), "Listed ids");
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Vault metadata
    // ------------------------------------------------------------------

    /// Persist vault metadata, overwriting the current file.
    pub async fn save_metadata(&self, metadata: &VaultMetadata) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        self.save_metadata_unlocked(metadata).await
    }

    pub(crate) async fn save_metadata_unlocked(&self, metadata: &VaultMetadata) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&self.metadata_path(), &bytes)
            .await
            .map_err(StorageError::Write)?;
        debug!("Vault metadata saved");
        Ok(())
    }

    /// Load vault metadata; `None` if the vault was never set up.
    ///
    /// # Errors
    /// - `StorageError::Read` if the file exists but cannot be read
    /// - `Error::Serialization` if it cannot be parsed
    pub async fn load_metadata(&self) -> Result<Option<VaultMetadata>> {
        let _guard = self.io_lock.lock().await;
        self.load_metadata_unlocked().await
    }

    pub(crate) async fn load_metadata_unlocked(&self) -> Result<Option<VaultMetadata>> {
        let bytes = match fs::read(self.metadata_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Read(e).into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Serialization(format!("vault metadata: {}", e)))
    }
}

/// Write `data` to `path` so readers never observe a partial file.
///
/// Writes a temp file in the same directory, syncs it, then renames it
/// over the target. The temp name carries a `.tmp` extension so directory
/// listings never mistake it for an item.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let result = async {
        let mut file = options.open(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use silentkey_crypto::Salt;
    use tempfile::TempDir;

    fn storage(temp: &TempDir) -> FileStorage {
        FileStorage::new(temp.path().join("Vault"), temp.path().join("Trash")).unwrap()
    }

    #[tokio::test]
    async fn test_new_creates_directories() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        assert!(storage.vault_dir().is_dir());
        assert!(storage.trash_dir().is_dir());
        assert_eq!(storage.retention(), Duration::days(30));
    }

    #[tokio::test]
    async fn test_new_fails_when_path_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let result = FileStorage::new(blocker.join("Vault"), temp.path().join("Trash"));
        assert!(matches!(
            result,
            Err(Error::Storage(StorageError::DirectoryCreation { .. }))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id = SecretId::new();

        storage.save(b"ciphertext-1", &id).await.unwrap();
        assert_eq!(storage.load(&id).await.unwrap(), b"ciphertext-1");

        storage.save(b"ciphertext-2", &id).await.unwrap();
        assert_eq!(storage.load(&id).await.unwrap(), b"ciphertext-2");

        let file = storage.vault_dir().join(format!("{}.vault", id));
        assert!(file.is_file());
        assert!(storage.contains(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        storage.save(b"data", &SecretId::new()).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(storage.vault_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".vault"));
    }

    #[tokio::test]
    async fn test_load_missing_is_read_error() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let result = storage.load(&SecretId::new()).await;
        match result {
            Err(Error::Storage(err @ StorageError::Read(_))) => {
                assert_eq!(err.io_kind(), io::ErrorKind::NotFound)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_listing_skips_malformed_names() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let id1 = SecretId::new();
        let id2 = SecretId::new();
        storage.save(b"a", &id1).await.unwrap();
        storage.save(b"b", &id2).await.unwrap();

        let vault = storage.vault_dir();
        std::fs::write(vault.join("not-a-uuid.vault"), b"x").unwrap();
        std::fs::write(vault.join(format!("{}.txt", SecretId::new())), b"x").unwrap();
        std::fs::write(vault.join("README"), b"x").unwrap();
        std::fs::write(storage.trash_dir().join("junk.trash"), b"x").unwrap();
        storage
            .save_metadata(&VaultMetadata::new(Salt::generate()))
            .await
            .unwrap();

        let mut ids = storage.list_all_ids().await.unwrap();
        ids.sort();
        let mut expected = vec![id1, id2];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(storage.list_trash_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_skips_non_canonical_uuid_stems() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        storage
            .save_metadata(&VaultMetadata::new(Salt::generate()))
            .await
            .unwrap();
        let id = SecretId::new();
        storage.save(b"good", &id).await.unwrap();

        let foreign = SecretId::new();
        let uuid = foreign.as_uuid();
        let vault = storage.vault_dir();
        let trash = storage.trash_dir();
        std::fs::write(vault.join(format!("{}.vault", uuid.simple())), b"x").unwrap();
        std::fs::write(vault.join(format!("{}.vault", uuid.braced())), b"x").unwrap();
        std::fs::write(
            vault.join(format!("{}.vault", foreign.to_string().to_uppercase())),
            b"x",
        )
        .unwrap();
        std::fs::write(trash.join(format!("{}.trash", uuid.simple())), b"x").unwrap();

        assert_eq!(storage.list_all_ids().await.unwrap(), vec![id]);
        assert!(storage.list_trash_ids().await.unwrap().is_empty());

        let backup = storage.create_backup().await.unwrap();
        assert!(!backup.is_empty());
        assert_eq!(storage.empty_trash().await.unwrap(), 0);
        assert_eq!(storage.clean_expired_trash().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_metadata_absent_then_present() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        assert!(storage.load_metadata().await.unwrap().is_none());

        let metadata = VaultMetadata::new(Salt::generate());
        storage.save_metadata(&metadata).await.unwrap();

        let loaded = storage.load_metadata().await.unwrap().unwrap();
        assert_eq!(loaded, metadata);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_an_error() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        std::fs::write(storage.vault_dir().join(METADATA_FILENAME), b"{oops").unwrap();

        assert!(matches!(
            storage.load_metadata().await,
            Err(Error::Serialization(_))
        ));
    }
}
