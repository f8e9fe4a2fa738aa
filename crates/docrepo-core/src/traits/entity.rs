//! The capability every persisted entity must provide.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::id::DocumentId;

/// Metadata the repository maintains on every entity.
///
/// Embed it in an entity with `#[serde(flatten)]` so the fields sit at the
/// top level of the stored document. Timestamps are stored as Unix
/// milliseconds so that they order correctly in queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    /// Document key.
    pub id: DocumentId,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    /// Number of updates plus one; `0` when the stored document has none.
    #[serde(default)]
    pub version: u64,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Soft-delete time.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A domain record persisted by a repository.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Product {
///     #[serde(flatten)]
///     meta: EntityMetadata,
///     name: String,
/// }
///
/// impl Entity for Product {
///     const COLLECTION: &'static str = "products";
///     const REQUIRED_FIELDS: &'static [&'static str] = &["name"];
///     fn metadata(&self) -> &EntityMetadata { &self.meta }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the entity is stored in.
    const COLLECTION: &'static str;

    /// Fields that must be present and non-null on create.
    const REQUIRED_FIELDS: &'static [&'static str] = &[];

    /// Access the repository-maintained metadata.
    fn metadata(&self) -> &EntityMetadata;

    /// Document key.
    fn id(&self) -> &DocumentId {
        &self.metadata().id
    }

    /// Current version.
    fn version(&self) -> u64 {
        self.metadata().version
    }

    /// Whether the entity is soft-deleted.
    fn is_deleted(&self) -> bool {
        self.metadata().is_deleted
    }
}
