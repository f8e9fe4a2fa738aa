//! Document identifier newtype.
//!
//! Ids are opaque strings chosen by the caller or generated by the store.
//! [`DocumentId::parse`] enforces the constraints a document store places
//! on keys; [`DocumentId::sanitized`] turns arbitrary text into a legal key.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::result::AppResult;

/// Maximum length of a document id in bytes.
pub const MAX_ID_LEN: usize = 1500;

/// Unique key of a document within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Validate and wrap a caller-supplied id.
    pub fn parse(raw: impl Into<String>) -> AppResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(AppError::validation("Document id must not be empty"));
        }
        if raw.contains('/') {
            return Err(AppError::validation(format!(
                "Document id '{raw}' must not contain '/'"
            )));
        }
        if raw.len() > MAX_ID_LEN {
            return Err(AppError::validation(format!(
                "Document id exceeds {MAX_ID_LEN} bytes"
            )));
        }
        Ok(Self(raw))
    }

    /// Generate a new time-ordered random identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Build an id from arbitrary text by keeping only alphanumerics,
    /// `-` and `_`, truncated to [`MAX_ID_LEN`].
    pub fn sanitized(raw: &str) -> AppResult<Self> {
        let mut cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        cleaned.truncate(MAX_ID_LEN);
        Self::parse(cleaned)
    }

    /// Build a composite id such as `takealot_12345` from several parts.
    pub fn compose(parts: &[&str]) -> AppResult<Self> {
        let joined = parts
            .iter()
            .map(|part| {
                part.chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                    .collect::<String>()
            })
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");
        Self::sanitized(&joined)
    }

    /// Wrap an id that already came from the store.
    pub fn from_trusted(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> String {
        id.0
    }
}
