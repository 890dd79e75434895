//! Vault engine for SilentKey.
//!
//! This module provides:
//! - The secret record model (`SecretRecord`, `SecretItem`, `SshKeyItem`)
//! - `VaultManager`, the lock/unlock state machine over encrypted storage
//! - `VaultSettings`, the JSON-backed configuration
//!
//! # Architecture
//! The vault sits between callers and storage. Records are wrapped in a
//! kind-tagged envelope, sealed by the crypto crate, and persisted by the
//! storage crate as opaque blobs.

pub mod config;
pub mod manager;
pub mod secret;

pub use config::{VaultSettings, MAX_TRASH_RETENTION_DAYS};
pub use manager::{Listing, SkipReason, SkippedRecord, VaultManager};
pub use secret::{SecretCategory, SecretItem, SecretRecord, SecretType, SshKeyItem};
