//! Vault settings.
//!
//! Settings live in an optional JSON file; every field has a default so an
//! empty object (or no file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use silentkey_common::{Error, Result};
use silentkey_crypto::KdfParams;
use silentkey_storage::{FileStorage, DEFAULT_TRASH_RETENTION_DAYS};

/// Application directory name under the platform data directory.
pub const APP_DIRNAME: &str = "SilentKey";

/// Active vault directory name under the root.
pub const VAULT_DIRNAME: &str = "Vault";

/// Trash directory name under the root.
pub const TRASH_DIRNAME: &str = "Trash";

/// Longest accepted trash retention, in days.
pub const MAX_TRASH_RETENTION_DAYS: i64 = 36_500;

/// Settings file name under the platform config directory.
pub const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// Directory holding the vault and trash directories.
    pub root: PathBuf,
    /// Argon2id parameters used for every derivation.
    pub kdf: KdfParams,
    /// Days a trashed item is kept before expiry cleanup removes it.
    pub trash_retention_days: i64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            kdf: KdfParams::default(),
            trash_retention_days: DEFAULT_TRASH_RETENTION_DAYS,
        }
    }
}

impl VaultSettings {
    /// Settings rooted at `root` with all other fields defaulted.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Default location of the settings file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIRNAME).join(SETTINGS_FILENAME))
    }

    /// Load settings from a JSON file.
    ///
    /// # Errors
    /// - `Error::Config` if the file cannot be read, parsed or validated
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let settings = Self::from_json(&json)?;
        debug!(path = %path.display(), "Settings loaded");
        Ok(settings)
    }

    /// Load from `path` if given, else from the default location if a file
    /// exists there, else fall back to defaults.
    ///
    /// An explicit path must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) => match std::fs::metadata(&path) {
                Ok(_) => Self::load(&path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
                Err(e) => Err(Error::Config(format!(
                    "cannot access {}: {}",
                    path.display(),
                    e
                ))),
            },
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// # Errors
    /// - `Error::Config` if the retention is outside
    ///   `0..=MAX_TRASH_RETENTION_DAYS` or the KDF parameters are zero
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_TRASH_RETENTION_DAYS).contains(&self.trash_retention_days) {
            return Err(Error::Config(format!(
                "trash_retention_days must be between 0 and {}",
                MAX_TRASH_RETENTION_DAYS
            )));
        }
        if self.kdf.memory_cost == 0 || self.kdf.time_cost == 0 || self.kdf.parallelism == 0 {
            return Err(Error::Config("kdf parameters must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.root.join(VAULT_DIRNAME)
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIRNAME)
    }

    /// Retention clamped to the accepted range.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.trash_retention_days.clamp(0, MAX_TRASH_RETENTION_DAYS))
    }

    /// Validate, then create the vault and trash directories and open
    /// storage over them.
    ///
    /// # Errors
    /// - `Error::Config` if the settings are invalid
    pub fn build_storage(&self) -> Result<FileStorage> {
        self.validate()?;
        Ok(FileStorage::new(self.vault_dir(), self.trash_dir())?.with_retention(self.retention()))
    }
}

fn default_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIRNAME)
}
