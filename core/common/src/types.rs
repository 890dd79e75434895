//! Common types used throughout SilentKey.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a secret.
///
/// The canonical string form (lowercase hyphenated UUID) doubles as the
/// on-disk file stem, so it must round-trip through [`SecretId::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(Uuid);

impl SecretId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse an id from its string form.
    ///
    /// Returns `None` for anything that is not a UUID; callers listing
    /// directories rely on this to skip foreign filenames.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Parse only the canonical form written by `Display` (lowercase,
    /// hyphenated). Used for file stems, which must map back to the exact
    /// path the id would be stored under.
    pub fn parse_canonical(s: &str) -> Option<Self> {
        Self::parse(s).filter(|id| id.to_string() == s)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SecretId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SecretId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s).ok_or_else(|| crate::Error::InvalidSecret(format!("invalid secret id: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_id_display_parses_back() {
        let id = SecretId::new();
        assert_eq!(SecretId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn test_canonical_parse_rejects_other_forms() {
        let id = SecretId::new();
        let uuid = id.as_uuid();

        assert_eq!(SecretId::parse_canonical(&id.to_string()), Some(id));
        for other in [
            id.to_string().to_uppercase(),
            uuid.simple().to_string(),
            uuid.braced().to_string(),
            uuid.urn().to_string(),
        ] {
            assert_eq!(SecretId::parse(&other), Some(id));
            assert_eq!(SecretId::parse_canonical(&other), None);
        }
    }

    #[test]
    fn test_secret_id_rejects_garbage() {
        assert!(SecretId::parse("metadata").is_none());
        assert!(SecretId::parse("").is_none());
        assert!("not-an-id".parse::<SecretId>().is_err());
    }

    #[test]
    fn test_secret_ids_are_unique() {
        assert_ne!(SecretId::new(), SecretId::new());
    }
}
