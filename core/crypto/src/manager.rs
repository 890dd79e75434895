//! Stateless encryption façade.
//!
//! `EncryptionManager` turns structured values into sealed bytes and back,
//! and passwords into keys. It owns no mutable state and can be cloned and
//! shared freely across tasks.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use crate::aead::{AuthenticatedCipher, XChaCha20Cipher};
use crate::kdf::{Argon2Kdf, KdfParams, KeyDerivation};
use crate::keys::{MasterKey, Salt};
use silentkey_common::encoding::base64_bytes;
use silentkey_common::{Error, Result};

/// Self-describing encrypted blob carrying its own salt.
///
/// Used for artifacts that live outside the vault (exports), so they can
/// be opened with a password alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContainer {
    pub salt: Salt,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedContainer {
    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Combines a [`KeyDerivation`] and an [`AuthenticatedCipher`].
#[derive(Clone)]
pub struct EncryptionManager {
    kdf: Arc<dyn KeyDerivation>,
    cipher: Arc<dyn AuthenticatedCipher>,
}

impl EncryptionManager {
    /// Argon2id + XChaCha20-Poly1305 with the given KDF parameters.
    pub fn new(params: KdfParams) -> Self {
        Self::with_capabilities(Arc::new(Argon2Kdf::new(params)), Arc::new(XChaCha20Cipher))
    }

    /// Build from explicit capabilities.
    pub fn with_capabilities(
        kdf: Arc<dyn KeyDerivation>,
        cipher: Arc<dyn AuthenticatedCipher>,
    ) -> Self {
        Self { kdf, cipher }
    }

    /// Derive a key from a password and salt.
    ///
    /// # Errors
    /// - `Error::InvalidPassword` if password is empty
    /// - `Error::KeyDerivation` if the capability fails
    pub fn derive_key(&self, password: &[u8], salt: &Salt) -> Result<MasterKey> {
        if password.is_empty() {
            return Err(Error::InvalidPassword);
        }
        debug!(cipher = self.cipher.name(), "Deriving key");
        self.kdf.derive(password, salt)
    }

    /// Serialize `item` to JSON and seal it.
    pub fn encrypt<T: Serialize + ?Sized>(&self, item: &T, key: &MasterKey) -> Result<Vec<u8>> {
        let plaintext = Zeroizing::new(serde_json::to_vec(item)?);
        self.cipher.seal(key, &plaintext)
    }

    /// Open `data` and deserialize it into `T`.
    ///
    /// # Errors
    /// - `Error::Decryption` if the tag does not verify or the plaintext
    ///   does not match `T`'s schema
    pub fn decrypt<T: DeserializeOwned>(&self, data: &[u8], key: &MasterKey) -> Result<T> {
        let plaintext = self.open_bytes(data, key)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| Error::Decryption(format!("unexpected payload: {}", e)))
    }

    /// Seal raw bytes.
    pub fn seal_bytes(&self, data: &[u8], key: &MasterKey) -> Result<Vec<u8>> {
        self.cipher.seal(key, data)
    }

    /// Open raw bytes. The plaintext is zeroized when dropped.
    pub fn open_bytes(&self, data: &[u8], key: &MasterKey) -> Result<Zeroizing<Vec<u8>>> {
        self.cipher.open(key, data).map(Zeroizing::new)
    }

    /// Encrypt `data` under a key derived from `password` and a fresh salt.
    pub fn encrypt_with_new_salt(&self, data: &[u8], password: &[u8]) -> Result<EncryptedContainer> {
        let salt = Salt::generate();
        let key = self.derive_key(password, &salt)?;
        let ciphertext = self.cipher.seal(&key, data)?;
        Ok(EncryptedContainer { salt, ciphertext })
    }

    /// Decrypt a container using the salt embedded in it.
    pub fn decrypt_container(
        &self,
        container: &EncryptedContainer,
        password: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.derive_key(password, &container.salt)?;
        self.open_bytes(&container.ciphertext, &key)
    }
}

impl Default for EncryptionManager {
    fn default() -> Self {
        Self::new(KdfParams::default())
    }
}
