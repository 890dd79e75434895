//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of key derivation salts in bytes.
pub const SALT_LENGTH: usize = 32;

/// Master key derived from the user's password.
///
/// Lives only in memory while the vault is unlocked. Never serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        self.key[..].ct_eq(&other.key[..]).into()
    }
}

impl Eq for MasterKey {}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Salt for key derivation.
///
/// Serialized as a base64 string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, failing on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; SALT_LENGTH]>::try_from(bytes).ok().map(Self)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(&encoded).map_err(serde::de::Error::custom)?;
        Salt::from_slice(&bytes).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "salt must be {} bytes, got {}",
                SALT_LENGTH,
                bytes.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate();
        let salt2 = Salt::generate();

        // Random salts should be different
        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }

    #[test]
    fn test_salt_serializes_as_base64() {
        let salt = Salt::from_bytes([7u8; SALT_LENGTH]);
        let json = serde_json::to_string(&salt).unwrap();
        assert!(json.starts_with('"'));

        let back: Salt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, salt);
    }

    #[test]
    fn test_salt_rejects_wrong_length() {
        let json = format!("\"{}\"", BASE64.encode([1u8; 8]));
        assert!(serde_json::from_str::<Salt>(&json).is_err());
        assert!(Salt::from_slice(&[0u8; 31]).is_none());
    }

    #[test]
    fn test_master_key_equality_and_debug() {
        let a = MasterKey::from_bytes([1u8; KEY_LENGTH]);
        let b = MasterKey::from_bytes([1u8; KEY_LENGTH]);
        let c = MasterKey::from_bytes([2u8; KEY_LENGTH]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(format!("{:?}", a), "MasterKey([REDACTED])");
    }
}
