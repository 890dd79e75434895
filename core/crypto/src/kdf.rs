//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks. It is reached
//! through the [`KeyDerivation`] capability so callers can substitute
//! another function.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::keys::{MasterKey, Salt, KEY_LENGTH};
use silentkey_common::{Error, Result};

/// Password-to-key capability.
///
/// Implementations must be deterministic for a given `(password, salt)`
/// pair and must not retain the password.
pub trait KeyDerivation: Send + Sync {
    /// Derive a symmetric key.
    ///
    /// # Errors
    /// - `Error::KeyDerivation` on an internal fault
    fn derive(&self, password: &[u8], salt: &Salt) -> Result<MasterKey>;
}

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    ///
    /// These parameters provide a balance between security and usability,
    /// targeting approximately 0.5-1 second of derivation time.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// Create moderate parameters for constrained machines.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Minimal parameters for test suites. Never use for real vaults.
    pub fn testing() -> Self {
        Self {
            memory_cost: 8192, // 8 MiB
            time_cost: 1,
            parallelism: 1,
        }
    }

    /// Resolve a preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "interactive" => Some(Self::interactive()),
            "moderate" => Some(Self::moderate()),
            "sensitive" => Some(Self::sensitive()),
            _ => None,
        }
    }
}

impl KdfParams {
    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_LENGTH),
        )
        .map_err(|e| Error::KeyDerivation(format!("invalid KDF parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive a master key from a password and salt using Argon2id.
///
/// # Preconditions
/// - `password` must not be empty
///
/// # Postconditions
/// - The same `(password, salt, params)` always yields the same key
///
/// # Errors
/// - `Error::InvalidPassword` if password is empty
/// - `Error::KeyDerivation` if the parameters are rejected or hashing fails
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<MasterKey> {
    if password.is_empty() {
        return Err(Error::InvalidPassword);
    }

    let mut out = Zeroizing::new([0u8; KEY_LENGTH]);
    params
        .argon2()?
        .hash_password_into(password, salt.as_bytes(), out.as_mut_slice())
        .map_err(|e| Error::KeyDerivation(format!("Argon2id hashing failed: {}", e)))?;

    Ok(MasterKey::from_bytes(*out))
}

/// Argon2id implementation of [`KeyDerivation`].
#[derive(Debug, Clone, Default)]
pub struct Argon2Kdf {
    params: KdfParams,
}

impl Argon2Kdf {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }
}

impl KeyDerivation for Argon2Kdf {
    fn derive(&self, password: &[u8], salt: &Salt) -> Result<MasterKey> {
        derive_key(password, salt, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salt(byte: u8) -> Salt {
        Salt::from_bytes([byte; 32])
    }

    #[test]
    fn test_same_inputs_same_key() {
        let kdf = Argon2Kdf::new(KdfParams::testing());

        let a = kdf.derive(b"hunter2", &salt(42)).unwrap();
        let b = kdf.derive(b"hunter2", &salt(42)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_salt_and_password_both_matter() {
        let kdf = Argon2Kdf::new(KdfParams::testing());
        let base = kdf.derive(b"hunter2", &salt(1)).unwrap();

        assert_ne!(base, kdf.derive(b"hunter2", &salt(2)).unwrap());
        assert_ne!(base, kdf.derive(b"hunter3", &salt(1)).unwrap());
    }

    #[test]
    fn test_params_change_the_key() {
        let stronger = KdfParams {
            time_cost: 2,
            ..KdfParams::testing()
        };

        let a = derive_key(b"pw", &salt(5), &KdfParams::testing()).unwrap();
        let b = derive_key(b"pw", &salt(5), &stronger).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_password_rejected() {
        let result = derive_key(b"", &Salt::generate(), &KdfParams::testing());
        assert!(matches!(result, Err(Error::InvalidPassword)));
    }

    #[test]
    fn test_bad_params_are_derivation_errors() {
        let params = KdfParams {
            memory_cost: 1,
            time_cost: 0,
            parallelism: 0,
        };
        let result = Argon2Kdf::new(params).derive(b"pw", &Salt::generate());

        assert!(matches!(result, Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_presets() {
        assert_eq!(KdfParams::default(), KdfParams::interactive());
        assert_eq!(KdfParams::preset("sensitive"), Some(KdfParams::sensitive()));
        assert_eq!(KdfParams::preset("testing"), None);
        assert!(KdfParams::moderate().memory_cost < KdfParams::interactive().memory_cost);
    }
}
