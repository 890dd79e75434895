//! Cryptographic boundary for SilentKey.
//!
//! This module provides:
//! - Key derivation using Argon2id behind the `KeyDerivation` capability
//! - Authenticated encryption using XChaCha20-Poly1305 behind the
//!   `AuthenticatedCipher` capability
//! - `EncryptionManager`, the stateless façade the vault talks to
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time comparison for key equality

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod manager;

pub use aead::{AuthenticatedCipher, XChaCha20Cipher, NONCE_SIZE, TAG_SIZE};
pub use kdf::{derive_key, Argon2Kdf, KdfParams, KeyDerivation};
pub use keys::{MasterKey, Salt};
pub use manager::{EncryptedContainer, EncryptionManager};
