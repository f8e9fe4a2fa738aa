//! Backing document store contract.
//!
//! The repository consumes the store only through these traits. Optional
//! primitives (`count`, `multi_get`) are advertised through
//! [`StoreCapabilities`]; the default implementations report
//! `NotImplemented`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::batch::{MAX_BATCH_SIZE, WriteBatch};
use crate::types::cursor::CursorBound;
use crate::types::document::{Document, DocumentPatch, StoredDocument};
use crate::types::filter::FilterField;
use crate::types::id::DocumentId;
use crate::types::sorting::SortField;

/// Optional primitives and limits of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// The store can count matching documents without fetching them.
    pub native_count: bool,
    /// The store can fetch many documents by id in one call.
    pub multi_get: bool,
    /// Maximum number of operations in one atomic batch.
    pub batch_limit: usize,
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self {
            native_count: false,
            multi_get: false,
            batch_limit: MAX_BATCH_SIZE,
        }
    }
}

/// A query as executed by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreQuery {
    /// Conjunctive filters.
    pub filters: Vec<FilterField>,
    /// Ordering; documents missing an ordering field are excluded.
    pub order_by: Vec<SortField>,
    /// Cursor bounds over the ordering fields.
    pub cursors: Vec<CursorBound>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

/// Trait for document store backends.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "memory").
    fn provider_type(&self) -> &str;

    /// Optional primitives and limits.
    fn capabilities(&self) -> StoreCapabilities;

    /// Generate a new document key.
    fn generate_id(&self) -> DocumentId {
        DocumentId::generate()
    }

    /// The store's notion of the current time.
    async fn server_time(&self) -> AppResult<DateTime<Utc>> {
        Ok(Utc::now())
    }

    /// Check whether the store is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Fetch a single document.
    async fn get(&self, collection: &str, id: &DocumentId) -> AppResult<Option<Document>>;

    /// Run a query.
    async fn query(&self, collection: &str, query: &StoreQuery) -> AppResult<Vec<StoredDocument>>;

    /// Count documents matching the filters.
    async fn count(&self, collection: &str, _filters: &[FilterField]) -> AppResult<u64> {
        Err(AppError::not_implemented(format!(
            "{} store has no native count for '{collection}'",
            self.provider_type()
        )))
    }

    /// Fetch many documents by id. Missing ids are omitted from the result.
    async fn multi_get(
        &self,
        collection: &str,
        _ids: &[DocumentId],
    ) -> AppResult<Vec<StoredDocument>> {
        Err(AppError::not_implemented(format!(
            "{} store has no multi-get for '{collection}'",
            self.provider_type()
        )))
    }

    /// Create or overwrite a document. Immediately durable.
    async fn write(&self, collection: &str, id: &DocumentId, document: Document) -> AppResult<()>;

    /// Patch an existing document. Fails with `NotFound` if it does not exist.
    async fn update(&self, collection: &str, id: &DocumentId, patch: &DocumentPatch)
    -> AppResult<()>;

    /// Remove a document. Removing a missing document is not an error.
    async fn remove(&self, collection: &str, id: &DocumentId) -> AppResult<()>;

    /// Commit a bounded batch atomically. Returns the number of operations written.
    async fn commit_batch(&self, batch: WriteBatch) -> AppResult<usize>;

    /// Open a transaction.
    async fn begin_transaction(&self) -> AppResult<Box<dyn StoreTransaction>>;
}

/// A store-native transaction.
///
/// Reads observe committed state. Writes are staged and take effect only on
/// [`commit`](StoreTransaction::commit), all together or not at all. A
/// commit that races with a concurrent writer on a document read inside the
/// transaction fails with `Contention`.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    /// Fetch a single document.
    async fn get(&mut self, collection: &str, id: &DocumentId) -> AppResult<Option<Document>>;

    /// Run a query.
    async fn query(&mut self, collection: &str, query: &StoreQuery)
    -> AppResult<Vec<StoredDocument>>;

    /// Stage a full-document write.
    fn set(&mut self, collection: &str, id: &DocumentId, document: Document);

    /// Stage a patch of an existing document.
    fn update(&mut self, collection: &str, id: &DocumentId, patch: DocumentPatch);

    /// Stage a removal.
    fn delete(&mut self, collection: &str, id: &DocumentId);

    /// Apply every staged write atomically. Returns the number of writes.
    async fn commit(self: Box<Self>) -> AppResult<usize>;

    /// Discard every staged write.
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}
