//! Secret records stored in the vault.
//!
//! Every record type implements [`SecretRecord`] and declares a stable
//! `KIND` tag. Records are persisted inside an envelope carrying that tag,
//! so a typed read can tell "another record type" apart from "corrupted".

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use silentkey_common::encoding::base64_bytes;
use silentkey_common::{Error, Result, SecretId};

/// Capabilities shared by every record type the vault can hold.
///
/// Implementations must serialize their id under the `id` key; the vault
/// rewrites that field when a restored record is assigned a new id.
pub trait SecretRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable tag written next to every persisted record of this type.
    const KIND: &'static str;

    fn id(&self) -> SecretId;

    fn title(&self) -> &str;

    /// Stamp the record as modified at `at`.
    fn set_modified_at(&mut self, at: DateTime<Utc>);

    /// Check the record before it is persisted.
    ///
    /// # Errors
    /// - `Error::InvalidSecret` if the title is blank
    fn validate(&self) -> Result<()> {
        if self.title().trim().is_empty() {
            return Err(Error::InvalidSecret("title must not be empty".to_string()));
        }
        Ok(())
    }

    /// Text matched by vault search.
    fn searchable_text(&self) -> String;
}

/// Kind of secret held by a [`SecretItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretType {
    ApiKey,
    Token,
    Credential,
    SshKey,
    Generic,
}

impl SecretType {
    pub const ALL: [SecretType; 5] = [
        SecretType::ApiKey,
        SecretType::Token,
        SecretType::Credential,
        SecretType::SshKey,
        SecretType::Generic,
    ];

    pub fn category(self) -> SecretCategory {
        match self {
            SecretType::ApiKey => SecretCategory::ApiKey,
            SecretType::Token => SecretCategory::Token,
            SecretType::Credential => SecretCategory::Password,
            SecretType::SshKey => SecretCategory::SshKey,
            SecretType::Generic => SecretCategory::Custom,
        }
    }

    /// Serialized name, e.g. `apiKey`.
    pub fn as_str(self) -> &'static str {
        match self {
            SecretType::ApiKey => "apiKey",
            SecretType::Token => "token",
            SecretType::Credential => "credential",
            SecretType::SshKey => "sshKey",
            SecretType::Generic => "generic",
        }
    }

    /// Parse the serialized name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display grouping derived from [`SecretType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretCategory {
    ApiKey,
    Token,
    Password,
    SshKey,
    Custom,
}

impl fmt::Display for SecretCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SecretCategory::ApiKey => "API Key",
            SecretCategory::Token => "Token",
            SecretCategory::Password => "Password",
            SecretCategory::SshKey => "SSH Key",
            SecretCategory::Custom => "Custom",
        };
        f.write_str(label)
    }
}

/// General-purpose secret record.
///
/// `encrypted_value` is opaque to the vault: callers decide what the bytes
/// mean. The whole record is sealed before it reaches disk.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretItem {
    pub id: SecretId,
    pub title: String,
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    #[serde(with = "base64_bytes")]
    pub encrypted_value: Vec<u8>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl SecretItem {
    /// New record with a fresh id and both timestamps set to now.
    pub fn new(title: impl Into<String>, secret_type: SecretType, value: impl Into<Vec<u8>>) -> Self {
        let now = Utc::now();
        Self {
            id: SecretId::new(),
            title: title.into(),
            secret_type,
            encrypted_value: value.into(),
            notes: None,
            created_at: now,
            modified_at: now,
            tags: BTreeSet::new(),
            is_favorite: false,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn category(&self) -> SecretCategory {
        self.secret_type.category()
    }
}

impl fmt::Debug for SecretItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretItem")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("secret_type", &self.secret_type)
            .field("encrypted_value", &"[REDACTED]")
            .field("notes", &self.notes)
            .field("created_at", &self.created_at)
            .field("modified_at", &self.modified_at)
            .field("tags", &self.tags)
            .field("is_favorite", &self.is_favorite)
            .finish()
    }
}

impl SecretRecord for SecretItem {
    const KIND: &'static str = "secret";

    fn id(&self) -> SecretId {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn set_modified_at(&mut self, at: DateTime<Utc>) {
        self.modified_at = at;
    }

    fn searchable_text(&self) -> String {
        searchable(&self.title, self.notes.as_deref(), &self.tags)
    }
}

/// SSH key pair record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyItem {
    pub id: SecretId,
    pub title: String,
    pub public_key: String,
    #[serde(with = "base64_bytes")]
    pub private_key: Vec<u8>,
    #[serde(default)]
    pub passphrase_hint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl SshKeyItem {
    pub fn new(
        title: impl Into<String>,
        public_key: impl Into<String>,
        private_key: impl Into<Vec<u8>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SecretId::new(),
            title: title.into(),
            public_key: public_key.into(),
            private_key: private_key.into(),
            passphrase_hint: None,
            created_at: now,
            modified_at: now,
            tags: BTreeSet::new(),
            is_favorite: false,
        }
    }
}

impl fmt::Debug for SshKeyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshKeyItem")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SecretRecord for SshKeyItem {
    const KIND: &'static str = "ssh_key";

    fn id(&self) -> SecretId {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn set_modified_at(&mut self, at: DateTime<Utc>) {
        self.modified_at = at;
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidSecret("title must not be empty".to_string()));
        }
        if self.private_key.is_empty() {
            return Err(Error::InvalidSecret("private key must not be empty".to_string()));
        }
        Ok(())
    }

    fn searchable_text(&self) -> String {
        searchable(&self.title, self.passphrase_hint.as_deref(), &self.tags)
    }
}

fn searchable(title: &str, notes: Option<&str>, tags: &BTreeSet<String>) -> String {
    let mut parts: Vec<&str> = vec![title];
    parts.extend(notes);
    parts.extend(tags.iter().map(String::as_str));
    parts.join(" ")
}

/// Serialized wrapper for a record of any kind.
#[derive(Serialize)]
pub(crate) struct EnvelopeRef<'a, T> {
    pub kind: &'a str,
    pub record: &'a T,
}

/// Decoded wrapper whose record has not been typed yet.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawEnvelope {
    pub kind: String,
    pub record: serde_json::Value,
}

impl RawEnvelope {
    /// Interpret the record as `T`.
    ///
    /// # Errors
    /// - `Error::WrongSecretKind` if the tag names another type
    /// - `Error::Decryption` if the record does not match `T`'s schema
    pub fn into_record<T: SecretRecord>(self) -> Result<T> {
        if self.kind != T::KIND {
            return Err(Error::WrongSecretKind {
                expected: T::KIND.to_string(),
                found: self.kind,
            });
        }
        serde_json::from_value(self.record)
            .map_err(|e| Error::Decryption(format!("unexpected payload: {}", e)))
    }

    /// Overwrite the embedded record id.
    pub fn set_id(&mut self, id: SecretId) -> Result<()> {
        let record = self
            .record
            .as_object_mut()
            .ok_or_else(|| Error::Decryption("record is not an object".to_string()))?;
        record.insert("id".to_string(), serde_json::Value::String(id.to_string()));
        Ok(())
    }
}
