//! Common utilities and types shared across SilentKey modules.
//!
//! This module provides foundational types that are used throughout the codebase,
//! ensuring consistency and type safety.

pub mod encoding;
pub mod error;
pub mod types;

pub use error::{Error, Result, StorageError};
pub use types::SecretId;
